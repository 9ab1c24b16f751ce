//! Heap region: the contiguous, program-break-backed arena.
//!
//! Owns `heap_start`/`heap_end`/`heap_size` and the logic to create the
//! arena lazily on first use and to double it on exhaustion. Never shrinks
//! — per the design's non-goals, memory is only ever returned to the OS
//! from the mmap path, never from the brk arena.

use crate::block::{self, prev_header, read_header, write_footer, write_header, Header};
use crate::freelist::FreeListIndex;
use crate::platform::Platform;
use crate::stats::Stats;

/// The brk-backed arena: `[start, end)`.
pub struct HeapRegion {
    start: *mut u8,
    end: *mut u8,
    size: usize,
    initialized: bool,
}

impl HeapRegion {
    pub const fn new() -> Self {
        Self {
            start: core::ptr::null_mut(),
            end: core::ptr::null_mut(),
            size: 0,
            initialized: false,
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    pub fn start(&self) -> *mut u8 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> *mut u8 {
        self.end
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns whether `header_ptr` lies within `[start, end)`. Used by the
    /// debug out-of-range check on `release`.
    #[inline]
    pub fn contains(&self, header_ptr: *mut u8) -> bool {
        header_ptr >= self.start && header_ptr < self.end
    }

    /// Initializes the arena on first use: aligns the break up to
    /// `ALIGNMENT`, extends it by `INITIAL_HEAP_SIZE`, and synthesizes one
    /// free block spanning the whole arena.
    ///
    /// # Safety
    /// Must only be called once, before any block in the arena exists.
    pub unsafe fn init(
        &mut self,
        platform: &impl Platform,
        free_list: &mut FreeListIndex,
        stats: &mut Stats,
    ) -> bool {
        let raw_start = platform.brk_current();
        let aligned_start = block::align_up_to_alignment(raw_start as usize) as *mut u8;
        let pad = aligned_start as usize - raw_start as usize;

        if pad > 0 {
            if let Err(e) = platform.brk_extend(pad) {
                stats.record_platform_error(e);
                return false;
            }
        }

        let start = match platform.brk_extend(block::INITIAL_HEAP_SIZE) {
            Ok(start) => start,
            Err(e) => {
                stats.record_platform_error(e);
                return false;
            }
        };

        self.start = start;
        self.size = block::INITIAL_HEAP_SIZE;
        self.end = unsafe { self.start.add(self.size) };
        self.initialized = true;

        let payload = self.size - block::BLOCK_OVERHEAD;
        write_header(self.start, Header::new(payload, true, false));
        write_footer(self.start, payload);
        free_list.add(self.start);

        true
    }

    /// Doubles the arena. If the last block of the old arena is free, it is
    /// removed from its list, grown in place, and reinserted; otherwise a
    /// fresh free block is synthesized over the new bytes.
    ///
    /// # Safety
    /// The arena must already be initialized and internally consistent.
    pub unsafe fn grow(
        &mut self,
        platform: &impl Platform,
        free_list: &mut FreeListIndex,
        stats: &mut Stats,
    ) -> bool {
        if self.size > usize::MAX / 2 {
            return false;
        }

        let old_end = self.end;
        if let Err(e) = platform.brk_extend(self.size) {
            stats.record_platform_error(e);
            return false;
        }

        let new_size = self.size * 2;
        let grown_by = self.size;
        self.end = unsafe { old_end.add(grown_by) };

        // The arena's last block is found by stepping back from `old_end`
        // through its footer (the boundary tag).
        let last_header = prev_header_at_end(old_end);
        let last = read_header(last_header);

        if last.is_free() {
            free_list.remove(last_header);
            let grown_payload = last.size() + grown_by;
            write_header(last_header, Header::new(grown_payload, true, false));
            write_footer(last_header, grown_payload);
            free_list.add(last_header);
        } else {
            let new_payload = grown_by - block::BLOCK_OVERHEAD;
            write_header(old_end, Header::new(new_payload, true, false));
            write_footer(old_end, new_payload);
            free_list.add(old_end);
        }

        self.size = new_size;
        true
    }
}

impl Default for HeapRegion {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks back from `end` (one past the last written footer) to the header
/// of the arena's final block.
unsafe fn prev_header_at_end(end: *mut u8) -> *mut u8 {
    // `prev_header` expects to be given the header just *after* the block
    // it should locate; a synthetic one-byte-past-the-footer pointer plays
    // that role here since `prev_header` only ever reads the footer that
    // immediately precedes its argument.
    prev_header(end)
}
