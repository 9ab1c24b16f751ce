//! Public API and the `#[global_allocator]` adapter.
//!
//! [`SegHeap`] owns all allocator state and is generic over the platform
//! backend purely so tests can swap it out; the process-wide instance is
//! always parameterized with [`UnixPlatform`]. [`LockedSegHeap`] is the
//! shell that lets a single, process-wide `static` satisfy `GlobalAlloc`'s
//! `Sync` bound without taking a real lock — this design is deliberately
//! single-threaded (see module docs at the crate root), so the wrapper only
//! asserts the absence of concurrent access rather than serializing it.

use core::cell::UnsafeCell;

use crate::block::{self, header_of, payload_of, read_header};
use crate::debug;
use crate::engine;
use crate::freelist::FreeListIndex;
use crate::heap::HeapRegion;
use crate::mmap;
use crate::platform::{self, Platform, UnixPlatform};
use crate::stats::Stats;

/// All allocator state, generic over the platform backend.
pub struct SegHeap<P: Platform> {
    heap: HeapRegion,
    free_list: FreeListIndex,
    stats: Stats,
    platform: P,
}

impl<P: Platform> SegHeap<P> {
    pub const fn new(platform: P) -> Self {
        Self {
            heap: HeapRegion::new(),
            free_list: FreeListIndex::new(),
            stats: Stats::new(),
            platform,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn dump_arena(&self) {
        crate::stats::dump_arena(&self.heap);
    }

    pub fn dump_free_lists(&self) {
        crate::stats::dump_free_lists(&self.free_list);
    }

    pub fn print_stats(&self) {
        crate::stats::print_stats(&self.stats);
    }

    /// Allocates `size` bytes, returning a null pointer on failure or when
    /// `size` is zero.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return core::ptr::null_mut();
        }

        let result = if size >= block::MMAP_THRESHOLD {
            unsafe { mmap::mmap_alloc(&self.platform, &mut self.stats, size) }
        } else {
            let payload = block::align_up_to_alignment(size).max(block::MIN_PAYLOAD);
            unsafe {
                engine::malloc_block(
                    &mut self.heap,
                    &mut self.free_list,
                    &self.platform,
                    &mut self.stats,
                    payload,
                )
                .map(payload_of)
            }
        };

        let Some(ptr) = result else {
            return core::ptr::null_mut();
        };

        let header_ptr = header_of(ptr);
        let header = unsafe { read_header(header_ptr) };
        debug::write_canary(header_ptr, header.size());
        debug::poison_alloc(ptr, header.size());

        if header.is_mmap() {
            self.stats.record_mmap_alloc(header.size());
        } else {
            self.stats.record_arena_alloc(header.size());
        }
        debug::run_checks(&self.heap, &self.free_list);

        ptr
    }

    /// Allocates space for `nmemb` elements of `size` bytes each, zeroed.
    /// Returns a null pointer on overflow or allocation failure.
    pub fn zero_alloc(&mut self, nmemb: usize, size: usize) -> *mut u8 {
        let Some(total) = nmemb.checked_mul(size) else {
            return core::ptr::null_mut();
        };

        let ptr = self.alloc(total);
        if !ptr.is_null() {
            unsafe { platform::fill(ptr, 0, total) };
        }
        ptr
    }

    /// Releases a pointer previously returned by `alloc`/`zero_alloc`/
    /// `resize`. A null pointer is a no-op.
    ///
    /// # Safety
    /// `ptr` must either be null or a pointer currently owned by this
    /// allocator, not already released.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let header_ptr = header_of(ptr);
        let header = read_header(header_ptr);

        if block::DEBUG_CHECKS && !header.is_mmap() && header.is_free() {
            debug::double_free_detected();
        }
        debug::check_canary(header_ptr, header.size());
        debug::poison_free(ptr, header.size());

        if header.is_mmap() {
            debug::check_in_range(&self.heap, header_ptr, true);
            self.stats.record_mmap_free(header.size());
            mmap::mmap_free(&self.platform, header_ptr);
            return;
        }

        debug::check_in_range(&self.heap, header_ptr, false);
        self.stats.record_arena_free(header.size());

        let size = header.size();
        crate::block::write_header(header_ptr, crate::block::Header::new(size, true, false));
        crate::block::write_footer(header_ptr, size);

        engine::coalesce_next(&self.heap, &mut self.free_list, header_ptr);
        let final_ptr = engine::coalesce_prev(&self.heap, &mut self.free_list, header_ptr);
        self.free_list.add(final_ptr);

        debug::run_checks(&self.heap, &self.free_list);
    }

    /// Resizes a previous allocation to `new_size`, preserving the
    /// min(old, new) leading bytes. A null `ptr` behaves like `alloc`; a
    /// zero `new_size` behaves like `release` and returns null.
    ///
    /// # Safety
    /// `ptr` must either be null or a pointer currently owned by this
    /// allocator.
    pub unsafe fn resize(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.alloc(new_size);
        }
        if new_size == 0 {
            self.release(ptr);
            return core::ptr::null_mut();
        }

        let header_ptr = header_of(ptr);
        let header = read_header(header_ptr);
        let old_size = header.size();

        if header.is_mmap() || new_size >= block::MMAP_THRESHOLD {
            return self.move_alloc(ptr, old_size, new_size);
        }

        let target = block::align_up_to_alignment(new_size).max(block::MIN_PAYLOAD);

        if target <= old_size {
            engine::shrink_block(&self.heap, &mut self.free_list, header_ptr, target);
            debug::write_canary(header_ptr, target);
            debug::run_checks(&self.heap, &self.free_list);
            return ptr;
        }

        if engine::grow_in_place(&self.heap, &mut self.free_list, header_ptr, target) {
            debug::write_canary(header_ptr, target);
            debug::run_checks(&self.heap, &self.free_list);
            return ptr;
        }

        self.move_alloc(ptr, old_size, new_size)
    }

    /// Fallback for `resize`: allocate fresh, copy the overlap, release the
    /// old block.
    unsafe fn move_alloc(&mut self, old_ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
        let new_ptr = self.alloc(new_size);
        if new_ptr.is_null() {
            return core::ptr::null_mut();
        }
        let copy_len = old_size.min(new_size);
        platform::copy(new_ptr, old_ptr, copy_len);
        self.release(old_ptr);
        new_ptr
    }
}

/// Thin `UnsafeCell` shell giving a single-threaded allocator a `Sync`
/// implementation so it can sit in a `static`. Carries none of the actual
/// cross-thread safety that name would imply elsewhere — calling any method
/// from more than one thread is undefined behavior, by design (this crate
/// does not support concurrent access).
struct AssertSingleThreaded<T>(UnsafeCell<T>);

unsafe impl<T> Sync for AssertSingleThreaded<T> {}

impl<T> AssertSingleThreaded<T> {
    const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn get(&self) -> &mut T {
        &mut *self.0.get()
    }
}

/// Global allocator wiring: a process-wide [`SegHeap`] behind the
/// single-threaded shell, exposed through [`core::alloc::GlobalAlloc`].
pub struct LockedSegHeap {
    inner: AssertSingleThreaded<SegHeap<UnixPlatform>>,
}

impl LockedSegHeap {
    pub const fn new() -> Self {
        Self {
            inner: AssertSingleThreaded::new(SegHeap::new(UnixPlatform)),
        }
    }

    /// Borrows the underlying [`SegHeap`] mutably, bypassing the `Sync`
    /// shell.
    ///
    /// # Safety
    /// Must not be called from more than one thread concurrently, and the
    /// returned borrow must not outlive the call that produced it (no two
    /// live borrows at once).
    #[inline]
    pub unsafe fn raw(&self) -> &mut SegHeap<UnixPlatform> {
        self.inner.get()
    }

    pub fn stats(&self) -> Stats {
        let inner = unsafe { self.inner.get() };
        Stats {
            arena_allocs: inner.stats.arena_allocs,
            arena_frees: inner.stats.arena_frees,
            arena_bytes_live: inner.stats.arena_bytes_live,
            mmap_allocs: inner.stats.mmap_allocs,
            mmap_frees: inner.stats.mmap_frees,
            mmap_bytes_live: inner.stats.mmap_bytes_live,
        }
    }

    pub fn print_stats(&self) {
        unsafe { self.inner.get() }.print_stats();
    }

    pub fn dump_arena(&self) {
        unsafe { self.inner.get() }.dump_arena();
    }

    pub fn dump_free_lists(&self) {
        unsafe { self.inner.get() }.dump_free_lists();
    }
}

impl Default for LockedSegHeap {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl core::alloc::GlobalAlloc for LockedSegHeap {
    unsafe fn alloc(&self, layout: core::alloc::Layout) -> *mut u8 {
        self.inner.get().alloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: core::alloc::Layout) {
        self.inner.get().release(ptr)
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: core::alloc::Layout, new_size: usize) -> *mut u8 {
        self.inner.get().resize(ptr, new_size)
    }
}
