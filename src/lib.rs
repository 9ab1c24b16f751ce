#![cfg_attr(not(test), no_std)]
#![allow(clippy::mut_from_ref)]
//! A segregated free-list heap allocator, backed by the process break for
//! ordinary requests and by anonymous `mmap` regions for large ones.
//!
//! The public surface is four functions — [`alloc`], [`release`],
//! [`resize`], [`zero_alloc`] — operating on one process-wide instance, plus
//! [`LockedSegHeap`], a [`core::alloc::GlobalAlloc`] adapter a consumer can
//! install as its own `#[global_allocator]`. Everything else (block layout,
//! free-list indexing, the brk arena, the mmap path, debug instrumentation
//! and stats) is `pub` for testing but not meant to be driven directly by a
//! consumer.
//!
//! This design is single-threaded by choice (see [`alloc::LockedSegHeap`]):
//! nothing here takes a lock, so sharing a process between this allocator
//! and more than one thread is undefined behavior.

pub mod alloc;
pub mod block;
pub mod debug;
pub mod engine;
pub mod freelist;
pub mod heap;
pub mod mmap;
pub mod platform;
pub mod stats;

pub use crate::alloc::LockedSegHeap;

// Backs the free-function API below. A consumer who wants this allocator
// installed process-wide instead declares their own:
//
// ```ignore
// #[global_allocator]
// static ALLOCATOR: segheap::LockedSegHeap = segheap::LockedSegHeap::new();
// ```
static ALLOCATOR: LockedSegHeap = LockedSegHeap::new();

/// Allocates `size` bytes from the process-wide instance. Returns a null
/// pointer on failure or when `size` is zero.
pub fn alloc(size: usize) -> *mut u8 {
    unsafe { ALLOCATOR.raw().alloc(size) }
}

/// Allocates zeroed space for `nmemb` elements of `size` bytes each from
/// the process-wide instance. Returns a null pointer on overflow or
/// allocation failure.
pub fn zero_alloc(nmemb: usize, size: usize) -> *mut u8 {
    unsafe { ALLOCATOR.raw().zero_alloc(nmemb, size) }
}

/// Releases a pointer previously returned by [`alloc`], [`zero_alloc`] or
/// [`resize`]. A null pointer is a no-op.
///
/// # Safety
/// `ptr` must either be null or a pointer currently owned by this
/// allocator, not already released.
pub unsafe fn release(ptr: *mut u8) {
    ALLOCATOR.raw().release(ptr)
}

/// Resizes a previous allocation to `new_size`. A null `ptr` behaves like
/// [`alloc`]; a zero `new_size` behaves like [`release`] and returns null.
///
/// # Safety
/// `ptr` must either be null or a pointer currently owned by this
/// allocator.
pub unsafe fn resize(ptr: *mut u8, new_size: usize) -> *mut u8 {
    ALLOCATOR.raw().resize(ptr, new_size)
}

/// Prints running allocation counters to standard error.
pub fn print_stats() {
    ALLOCATOR.print_stats();
}

/// Prints a block-by-block dump of the arena to standard output.
pub fn dump_arena() {
    ALLOCATOR.dump_arena();
}

/// Prints a class-by-class dump of the free lists to standard output.
pub fn dump_free_lists() {
    ALLOCATOR.dump_free_lists();
}
