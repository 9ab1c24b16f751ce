//! Large-block path: requests at or above [`block::MMAP_THRESHOLD`] are
//! served from their own anonymous mapping instead of the arena.
//!
//! A large block has no footer and no canary — it is never coalesced,
//! split, or filed on a free list, so none of that machinery applies. Its
//! layout is just `[ header | payload ]`, and its header carries
//! `MMAP_BIT`.

use crate::block::{self, payload_of, read_header, write_header, Header};
use crate::platform::Platform;
use crate::stats::Stats;

/// Total bytes to map for a large request of `size` payload bytes: header,
/// payload and canary — the canary region is reserved even though a large
/// block has no footer, since `alloc` writes one there unconditionally in a
/// `debug-checks` build. Rounded up to a whole page by the kernel
/// regardless, but rounded here to [`block::ALIGNMENT`] so header/payload
/// arithmetic stays exact.
#[inline]
fn mapped_span(size: usize) -> usize {
    block::align_up_to_alignment(block::HEADER_SIZE + size + block::CANARY_SIZE)
}

/// Maps a fresh region for a payload of `size` bytes and returns its
/// payload pointer, or `None` if the mapping failed (recorded in `stats`).
///
/// # Safety
/// `platform` must be the same backend used for every other mapping in this
/// process (so `release` can hand the same size back to `unmap`).
pub unsafe fn mmap_alloc(platform: &impl Platform, stats: &mut Stats, size: usize) -> Option<*mut u8> {
    let span = mapped_span(size);
    let header_ptr = match platform.map_anon(span) {
        Ok(ptr) => ptr,
        Err(e) => {
            stats.record_platform_error(e);
            return None;
        }
    };
    write_header(header_ptr, Header::new(size, false, true));
    Some(payload_of(header_ptr))
}

/// Unmaps the large block backing `payload`.
///
/// # Safety
/// `payload` must point at a live large block's payload, i.e. one obtained
/// from [`mmap_alloc`] and not yet released.
pub unsafe fn mmap_free(platform: &impl Platform, header_ptr: *mut u8) {
    let size = read_header(header_ptr).size();
    let span = mapped_span(size);
    platform.unmap(header_ptr, span);
}
