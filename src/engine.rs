//! Block engine: coalescing, splitting, and the arena allocation path.
//!
//! Everything here operates on blocks already known to live in the arena
//! (as opposed to `mmap.rs`, which handles the large, non-coalesced path).

use crate::block::{
    self, next_header, prev_header, read_header, write_footer, write_header, Header,
};
use crate::freelist::FreeListIndex;
use crate::heap::HeapRegion;
use crate::platform::Platform;

/// Merges `header_ptr` with its predecessor if the predecessor is free,
/// returning the header of the resulting (possibly unchanged) block.
///
/// # Safety
/// `header_ptr` must be a live arena block; `heap` must describe the arena
/// it lives in.
pub unsafe fn coalesce_prev(
    heap: &HeapRegion,
    free_list: &mut FreeListIndex,
    header_ptr: *mut u8,
) -> *mut u8 {
    if (header_ptr as usize) < heap.start() as usize + block::MIN_BLOCK_SIZE {
        return header_ptr;
    }

    let prev = prev_header(header_ptr);
    let prev_hdr = read_header(prev);
    if !prev_hdr.is_free() {
        return header_ptr;
    }

    let cur_size = read_header(header_ptr).size();
    free_list.remove(prev);
    let merged = prev_hdr.size() + block::BLOCK_OVERHEAD + cur_size;
    write_header(prev, Header::new(merged, true, false));
    write_footer(prev, merged);
    prev
}

/// Merges the block at `header_ptr` with its successor if the successor is
/// free, updating `header_ptr`'s own header/footer in place.
///
/// # Safety
/// `header_ptr` must be a live arena block; `heap` must describe the arena
/// it lives in.
pub unsafe fn coalesce_next(heap: &HeapRegion, free_list: &mut FreeListIndex, header_ptr: *mut u8) {
    let cur_size = read_header(header_ptr).size();
    let next = next_header(header_ptr, cur_size);
    if next >= heap.end() {
        return;
    }

    let next_hdr = read_header(next);
    if !next_hdr.is_free() {
        return;
    }

    free_list.remove(next);
    let merged = cur_size + block::BLOCK_OVERHEAD + next_hdr.size();
    write_header(header_ptr, Header::new(merged, true, false));
    write_footer(header_ptr, merged);
}

/// Shrinks an allocated block to `new_size`, splitting off and filing a
/// trailing free block when the leftover is large enough to host one. Does
/// nothing if the leftover would be smaller than [`block::MIN_BLOCK_SIZE`].
///
/// # Safety
/// `header_ptr` must be a live, currently-allocated arena block with
/// `new_size < ` its current size.
pub unsafe fn shrink_block(
    heap: &HeapRegion,
    free_list: &mut FreeListIndex,
    header_ptr: *mut u8,
    new_size: usize,
) {
    let old_size = read_header(header_ptr).size();
    let leftover = old_size - new_size;
    if leftover < block::MIN_BLOCK_SIZE {
        return;
    }

    write_header(header_ptr, Header::new(new_size, false, false));
    write_footer(header_ptr, new_size);

    let split = next_header(header_ptr, new_size);
    let split_size = leftover - block::BLOCK_OVERHEAD;
    write_header(split, Header::new(split_size, true, false));
    write_footer(split, split_size);

    coalesce_next(heap, free_list, split);
    free_list.add(split);
}

/// Attempts to satisfy a resize to `new_size` by absorbing the immediate
/// successor, without moving the block. Returns `true` on success.
///
/// If the successor is free and large enough, it is always removed from its
/// list: either fully absorbed (if what would remain is smaller than
/// [`block::MIN_PAYLOAD`]) or split, filing the remainder as a new free
/// block.
///
/// # Safety
/// `header_ptr` must be a live, currently-allocated arena block.
pub unsafe fn grow_in_place(
    heap: &HeapRegion,
    free_list: &mut FreeListIndex,
    header_ptr: *mut u8,
    new_size: usize,
) -> bool {
    let old_size = read_header(header_ptr).size();
    let next = next_header(header_ptr, old_size);
    if next >= heap.end() {
        return false;
    }

    let next_hdr = read_header(next);
    if !next_hdr.is_free() {
        return false;
    }

    // Absorbing the successor reclaims its header, canary and footer as
    // payload space, not just its payload.
    let combined_payload = old_size + block::BLOCK_OVERHEAD + next_hdr.size();
    if combined_payload < new_size {
        return false;
    }

    free_list.remove(next);
    let residual = combined_payload - new_size;

    if residual < block::MIN_BLOCK_SIZE {
        let absorbed_start = block::canary_at(header_ptr, old_size);
        let absorbed_len = combined_payload - old_size;
        crate::debug::poison_alloc(absorbed_start, absorbed_len);
        write_header(header_ptr, Header::new(combined_payload, false, false));
        write_footer(header_ptr, combined_payload);
    } else {
        let absorbed_start = block::canary_at(header_ptr, old_size);
        crate::debug::poison_alloc(absorbed_start, new_size - old_size);
        write_header(header_ptr, Header::new(new_size, false, false));
        write_footer(header_ptr, new_size);

        let split = next_header(header_ptr, new_size);
        let split_size = residual - block::BLOCK_OVERHEAD;
        write_header(split, Header::new(split_size, true, false));
        write_footer(split, split_size);
        free_list.add(split);
    }

    true
}

/// Finds or creates a free block of at least `size` payload bytes, splits
/// off the tail if the remainder would be useful, and returns the header of
/// the now-allocated block. Grows the arena (possibly repeatedly) when no
/// existing free block fits.
///
/// # Safety
/// `heap` and `free_list` must describe a consistent arena.
pub unsafe fn malloc_block(
    heap: &mut HeapRegion,
    free_list: &mut FreeListIndex,
    platform: &impl Platform,
    stats: &mut crate::stats::Stats,
    size: usize,
) -> Option<*mut u8> {
    if !heap.is_initialized() && !heap.init(platform, free_list, stats) {
        return None;
    }

    let found = loop {
        if let Some(h) = free_list.find_fit(size) {
            break h;
        }
        if !heap.grow(platform, free_list, stats) {
            return None;
        }
    };

    let block_size = read_header(found).size();
    let leftover = block_size - size;

    if leftover >= block::MIN_BLOCK_SIZE {
        write_header(found, Header::new(size, false, false));
        write_footer(found, size);

        let split = next_header(found, size);
        let split_size = leftover - block::BLOCK_OVERHEAD;
        write_header(split, Header::new(split_size, true, false));
        write_footer(split, split_size);
        free_list.add(split);
    } else {
        write_header(found, Header::new(block_size, false, false));
        write_footer(found, block_size);
    }

    Some(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Platform, PlatformError};
    use crate::stats::Stats;
    use std::cell::Cell;

    /// A platform backend that serves `brk` from a fixed buffer and never
    /// satisfies `map_anon`, letting these tests run without touching real
    /// process memory.
    struct FakePlatform {
        buf: *mut u8,
        len: usize,
        used: Cell<usize>,
    }

    impl FakePlatform {
        fn new(buf: &mut [u8]) -> Self {
            Self {
                buf: buf.as_mut_ptr(),
                len: buf.len(),
                used: Cell::new(0),
            }
        }
    }

    impl Platform for FakePlatform {
        fn brk_current(&self) -> *mut u8 {
            unsafe { self.buf.add(self.used.get()) }
        }

        fn brk_extend(&self, delta: usize) -> Result<*mut u8, PlatformError> {
            let cur = self.used.get();
            if cur + delta > self.len {
                return Err(PlatformError::BrkExhausted);
            }
            self.used.set(cur + delta);
            Ok(unsafe { self.buf.add(cur) })
        }

        fn map_anon(&self, _size: usize) -> Result<*mut u8, PlatformError> {
            Err(PlatformError::MapRejected)
        }

        unsafe fn unmap(&self, _ptr: *mut u8, _size: usize) {}
    }

    #[test]
    fn malloc_then_split_leaves_a_free_remainder() {
        let mut buf = vec![0u8; 64 * 1024];
        let platform = FakePlatform::new(&mut buf);
        let mut heap = HeapRegion::new();
        let mut free_list = FreeListIndex::new();
        let mut stats = Stats::new();

        unsafe {
            let a = malloc_block(&mut heap, &mut free_list, &platform, &mut stats, 64).unwrap();
            assert!(!read_header(a).is_free());
            assert_eq!(read_header(a).size(), 64);
        }
    }

    #[test]
    fn freeing_adjacent_blocks_coalesces() {
        let mut buf = vec![0u8; 64 * 1024];
        let platform = FakePlatform::new(&mut buf);
        let mut heap = HeapRegion::new();
        let mut free_list = FreeListIndex::new();
        let mut stats = Stats::new();

        unsafe {
            let a = malloc_block(&mut heap, &mut free_list, &platform, &mut stats, 64).unwrap();
            let b = malloc_block(&mut heap, &mut free_list, &platform, &mut stats, 64).unwrap();

            write_header(b, Header::new(read_header(b).size(), true, false));
            write_footer(b, read_header(b).size());
            free_list.add(b);

            write_header(a, Header::new(read_header(a).size(), true, false));
            write_footer(a, read_header(a).size());
            free_list.add(a);

            let merged = coalesce_prev(&heap, &mut free_list, b);
            assert_eq!(merged, a);
            assert!(read_header(a).is_free());
        }
    }
}
