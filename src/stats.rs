//! Best-effort counters and human-readable dumps.
//!
//! None of this feeds back into allocator decisions — the counts exist for
//! diagnostics only, so overflow or a racing reader (there are none, this
//! crate is single-threaded) is not a correctness concern. Output goes
//! straight to a file descriptor via `write(2)`; nothing here allocates, so
//! calling it from inside the allocator it is instrumenting can't recurse.

use numtoa::NumToA;

use crate::block::{self, read_header};
use crate::freelist::FreeListIndex;
use crate::heap::HeapRegion;
use crate::platform::PlatformError;

const STDOUT: i32 = 1;
const STDERR: i32 = 2;

#[derive(Debug, Default)]
pub struct Stats {
    pub arena_allocs: u64,
    pub arena_frees: u64,
    pub arena_bytes_live: u64,
    pub mmap_allocs: u64,
    pub mmap_frees: u64,
    pub mmap_bytes_live: u64,
    /// Times `brk_extend` failed to grow the program break.
    pub brk_exhausted: u64,
    /// Times `map_anon` failed to obtain a fresh mapping from the OS.
    pub map_rejected: u64,
}

impl Stats {
    pub const fn new() -> Self {
        Self {
            arena_allocs: 0,
            arena_frees: 0,
            arena_bytes_live: 0,
            mmap_allocs: 0,
            mmap_frees: 0,
            mmap_bytes_live: 0,
            brk_exhausted: 0,
            map_rejected: 0,
        }
    }

    /// Records a failed platform call, for diagnostics only — it never
    /// feeds back into an allocation decision.
    #[inline]
    pub fn record_platform_error(&mut self, err: PlatformError) {
        match err {
            PlatformError::BrkExhausted => self.brk_exhausted += 1,
            PlatformError::MapRejected => self.map_rejected += 1,
        }
    }

    #[inline]
    pub fn record_arena_alloc(&mut self, size: usize) {
        self.arena_allocs += 1;
        self.arena_bytes_live += size as u64;
    }

    #[inline]
    pub fn record_arena_free(&mut self, size: usize) {
        self.arena_frees += 1;
        self.arena_bytes_live = self.arena_bytes_live.saturating_sub(size as u64);
    }

    #[inline]
    pub fn record_mmap_alloc(&mut self, size: usize) {
        self.mmap_allocs += 1;
        self.mmap_bytes_live += size as u64;
    }

    #[inline]
    pub fn record_mmap_free(&mut self, size: usize) {
        self.mmap_frees += 1;
        self.mmap_bytes_live = self.mmap_bytes_live.saturating_sub(size as u64);
    }
}

fn write_fd(fd: i32, bytes: &[u8]) {
    let mut off = 0;
    while off < bytes.len() {
        let n = unsafe {
            libc::write(
                fd,
                bytes[off..].as_ptr() as *const libc::c_void,
                bytes.len() - off,
            )
        };
        if n <= 0 {
            return;
        }
        off += n as usize;
    }
}

fn write_line(fd: i32, parts: &[&[u8]]) {
    for p in parts {
        write_fd(fd, p);
    }
    write_fd(fd, b"\n");
}

fn write_u64(fd: i32, label: &[u8], value: u64) {
    let mut buf = [0u8; 20];
    write_line(fd, &[label, value.na(&mut buf)]);
}

/// Prints the running counters to standard error.
pub fn print_stats(stats: &Stats) {
    write_u64(STDERR, b"segheap: arena allocs       = ", stats.arena_allocs);
    write_u64(STDERR, b"segheap: arena frees        = ", stats.arena_frees);
    write_u64(
        STDERR,
        b"segheap: arena bytes live   = ",
        stats.arena_bytes_live,
    );
    write_u64(STDERR, b"segheap: mmap allocs        = ", stats.mmap_allocs);
    write_u64(STDERR, b"segheap: mmap frees         = ", stats.mmap_frees);
    write_u64(
        STDERR,
        b"segheap: mmap bytes live    = ",
        stats.mmap_bytes_live,
    );
    write_u64(STDERR, b"segheap: brk exhausted      = ", stats.brk_exhausted);
    write_u64(STDERR, b"segheap: map rejected       = ", stats.map_rejected);
}

/// Walks the arena front to back, printing one line per block: its offset
/// from `heap_start`, its size, and whether it is free.
pub fn dump_arena(heap: &HeapRegion) {
    if !heap.is_initialized() {
        write_fd(STDOUT, b"segheap: arena not initialized\n");
        return;
    }

    write_fd(STDOUT, b"segheap: arena dump\n");
    let mut cur = heap.start();
    while cur < heap.end() {
        let header = unsafe { read_header(cur) };
        let offset = cur as usize - heap.start() as usize;
        let mut off_buf = [0u8; 20];
        let mut size_buf = [0u8; 20];
        write_line(
            STDOUT,
            &[
                b"  offset=",
                offset.na(&mut off_buf),
                b" size=",
                header.size().na(&mut size_buf),
                if header.is_free() { b" FREE" } else { b" USED" },
            ],
        );
        cur = block::next_header(cur, header.size());
    }
}

/// Prints the block count and total free bytes filed under each
/// non-empty size class.
pub fn dump_free_lists(free_list: &FreeListIndex) {
    write_fd(STDOUT, b"segheap: free list dump\n");
    let mut counts = [0u64; block::BIN_COUNT];
    let mut bytes = [0u64; block::BIN_COUNT];
    unsafe {
        free_list.walk(|class, _ptr, header| {
            counts[class] += 1;
            bytes[class] += header.size() as u64;
        });
    }

    for (i, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let mut b1 = [0u8; 20];
        let mut b2 = [0u8; 20];
        let mut b3 = [0u8; 20];
        write_line(
            STDOUT,
            &[
                b"  class ",
                i.na(&mut b1),
                b": blocks=",
                count.na(&mut b2),
                b" bytes=",
                bytes[i].na(&mut b3),
            ],
        );
    }
}
