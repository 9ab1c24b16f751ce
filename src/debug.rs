//! Debug instrumentation: canaries, poisoning, double-free detection and
//! the post-call heap/free-list walk.
//!
//! Everything here is compiled in only under the `debug-checks` feature; the
//! non-debug build gets no-op stubs with the same signatures; one draft of
//! the original design already had the same split (see
//! `write_canary`/`check_canary` stubs below).

use crate::block::{
    self, canary_at, read_footer, read_header, CANARY_BYTE, DEBUG_CHECKS, FREE_POISON_BYTE,
    ALLOC_POISON_BYTE,
};
use crate::freelist::FreeListIndex;
use crate::heap::HeapRegion;
use crate::platform::fill;

/// Aborts the process with a short diagnostic. Only ever called from a
/// `debug-checks` build — outside it, the conditions this guards are never
/// even evaluated.
#[cold]
#[inline(never)]
pub fn trap(msg: &str) -> ! {
    panic!("segheap: {msg}");
}

/// Writes the canary immediately after a block's payload.
#[inline]
pub fn write_canary(header_ptr: *mut u8, size: usize) {
    if DEBUG_CHECKS {
        unsafe { fill(canary_at(header_ptr, size), CANARY_BYTE, block::CANARY_SIZE) }
    }
}

/// Verifies a block's canary, trapping on mismatch.
#[inline]
pub fn check_canary(header_ptr: *mut u8, size: usize) {
    if DEBUG_CHECKS {
        let canary = canary_at(header_ptr, size);
        for i in 0..block::CANARY_SIZE {
            if unsafe { *canary.add(i) } != CANARY_BYTE {
                trap("canary corrupted (heap overflow or stale pointer)");
            }
        }
    }
}

/// Poisons a payload right after it has been handed to the caller on
/// `alloc`/`zero_alloc` growth, or right after `release` has taken it back.
#[inline]
pub fn poison(payload: *mut u8, size: usize, byte: u8) {
    if DEBUG_CHECKS {
        unsafe { fill(payload, byte, size) }
    }
}

#[inline]
pub fn poison_alloc(payload: *mut u8, size: usize) {
    poison(payload, size, ALLOC_POISON_BYTE);
}

#[inline]
pub fn poison_free(payload: *mut u8, size: usize) {
    poison(payload, size, FREE_POISON_BYTE);
}

/// Checks that `header_ptr` either lies within the arena or carries
/// `MMAP_BIT`; traps otherwise. Only meaningful once the arena has been
/// initialized.
#[inline]
pub fn check_in_range(heap: &HeapRegion, header_ptr: *mut u8, is_mmap: bool) {
    if DEBUG_CHECKS && !is_mmap && !heap.contains(header_ptr) {
        trap("pointer is not in the accepted range");
    }
}

/// Traps on a double free; a no-op call site outside debug builds silently
/// returns instead (the caller is responsible for that branch).
#[inline]
pub fn double_free_detected() -> ! {
    trap("double free detected");
}

/// Walks every block in the arena, from `heap_start` to `heap_end`,
/// asserting the universal invariants of the design (§8): sizes aligned,
/// header/footer agreement, no two adjacent free blocks, and (when `f` is
/// supplied) lets the caller inspect each block.
///
/// No-op outside `debug-checks` builds.
pub fn heap_walk(heap: &HeapRegion, mut f: impl FnMut(*mut u8, block::Header)) {
    if !DEBUG_CHECKS || !heap.is_initialized() {
        return;
    }

    let mut cur = heap.start();
    let mut prev_was_free = false;
    while cur < heap.end() {
        let header = unsafe { read_header(cur) };
        let size = header.size();

        if size % block::ALIGNMENT != 0 {
            trap("block size is not aligned");
        }
        let footer = unsafe { read_footer(cur) };
        if footer.size() != size {
            trap("header/footer size mismatch");
        }
        if header.is_free() && prev_was_free {
            trap("two adjacent free blocks survived coalescing");
        }

        f(cur, header);
        prev_was_free = header.is_free();
        cur = block::next_header(cur, size);
    }
}

/// Walks every free list, asserting that every linked block is marked free
/// and filed under the class its size maps to, and that the presence
/// bitmap agrees with actual occupancy.
///
/// No-op outside `debug-checks` builds.
pub fn free_list_walk(free_list: &FreeListIndex) {
    if !DEBUG_CHECKS {
        return;
    }

    for i in 0..block::BIN_COUNT {
        if !free_list.bit_matches_occupancy(i) {
            trap("free_map bit disagrees with list occupancy");
        }
    }

    unsafe {
        free_list.walk(|class, _header_ptr, header| {
            if !header.is_free() {
                trap("block on a free list is not marked free");
            }
            if crate::freelist::class_of(header.size()) != class {
                trap("block filed under the wrong size class");
            }
        });
    }
}

/// Runs both walks; the single entry point the public API calls after
/// every operation in a `debug-checks` build (mirrors `MM_RUN_CHECKS()` in
/// the original design).
pub fn run_checks(heap: &HeapRegion, free_list: &FreeListIndex) {
    if !DEBUG_CHECKS {
        return;
    }
    heap_walk(heap, |_, _| {});
    free_list_walk(free_list);
}
