//! End-to-end scenarios against the real process-wide allocator instance,
//! driving `UnixPlatform`'s actual `sbrk`/`mmap` calls.
//!
//! The instance is process-wide and takes no internal lock (by design —
//! this allocator is single-threaded), so every test serializes on
//! `GUARD` before touching it; cargo otherwise runs tests in this binary on
//! separate threads and would race the same arena.

use std::sync::Mutex;

static GUARD: Mutex<()> = Mutex::new(());

fn clear_poison(guard: std::sync::MutexGuard<'_, ()>) -> std::sync::MutexGuard<'_, ()> {
    guard
}

macro_rules! locked {
    ($body:block) => {{
        let guard = GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let guard = clear_poison(guard);
        let result = (|| $body)();
        drop(guard);
        result
    }};
}

#[test]
fn integrity_survives_interleaved_frees() {
    locked!({
        unsafe {
            let a = segheap::alloc(64);
            let b = segheap::alloc(64);
            let c = segheap::alloc(64);
            assert!(!a.is_null() && !b.is_null() && !c.is_null());

            core::ptr::write_bytes(a, 0xAA, 64);
            core::ptr::write_bytes(b, 0xBB, 64);
            core::ptr::write_bytes(c, 0xCC, 64);

            segheap::release(b);

            for i in 0..64 {
                assert_eq!(*a.add(i), 0xAA);
                assert_eq!(*c.add(i), 0xCC);
            }

            segheap::release(a);
            segheap::release(c);
        }
    })
}

#[test]
fn exhaustion_then_half_refill_succeeds() {
    locked!({
        unsafe {
            let mut blocks = Vec::with_capacity(1024);
            for _ in 0..1024 {
                let p = segheap::alloc(64);
                assert!(!p.is_null());
                blocks.push(p);
            }

            for (i, &p) in blocks.iter().enumerate() {
                if i % 2 == 0 {
                    segheap::release(p);
                }
            }

            for _ in 0..(blocks.len() / 2) {
                let p = segheap::alloc(64);
                assert!(!p.is_null());
                segheap::release(p);
            }

            for (i, &p) in blocks.iter().enumerate() {
                if i % 2 == 1 {
                    segheap::release(p);
                }
            }
        }
    })
}

#[test]
fn shrink_preserves_leading_bytes() {
    locked!({
        unsafe {
            let p = segheap::alloc(128);
            assert!(!p.is_null());
            for i in 0..128u8 {
                *p.add(i as usize) = i;
            }

            let p = segheap::resize(p, 32);
            assert!(!p.is_null());
            for i in 0..32u8 {
                assert_eq!(*p.add(i as usize), i);
            }

            segheap::release(p);
        }
    })
}

#[test]
fn grow_preserves_leading_bytes() {
    locked!({
        unsafe {
            let p = segheap::alloc(32);
            assert!(!p.is_null());
            core::ptr::write_bytes(p, 0x5A, 32);

            let p = segheap::resize(p, 256);
            assert!(!p.is_null());
            for i in 0..32 {
                assert_eq!(*p.add(i), 0x5A);
            }

            segheap::release(p);
        }
    })
}

#[test]
fn large_requests_round_trip_through_mmap() {
    locked!({
        unsafe {
            const MIB_8: usize = 8 * 1024 * 1024;
            let mut slots = [core::ptr::null_mut::<u8>(); 4];
            for slot in slots.iter_mut() {
                *slot = segheap::alloc(MIB_8);
                assert!(!slot.is_null());
            }
            for &slot in slots.iter() {
                segheap::release(slot);
            }
        }
    })
}

#[test]
fn boundary_between_arena_and_mmap_paths() {
    use segheap::block::MMAP_THRESHOLD;
    locked!({
        unsafe {
            let just_under = segheap::alloc(MMAP_THRESHOLD - 1);
            let at_threshold = segheap::alloc(MMAP_THRESHOLD);
            assert!(!just_under.is_null());
            assert!(!at_threshold.is_null());
            segheap::release(just_under);
            segheap::release(at_threshold);
        }
    })
}

#[test]
fn zero_size_request_returns_null() {
    locked!({
        let p = segheap::alloc(0);
        assert!(p.is_null());
    })
}

#[test]
fn zero_alloc_zeroes_memory_and_rejects_overflow() {
    locked!({
        unsafe {
            let p = segheap::zero_alloc(16, 8);
            assert!(!p.is_null());
            for i in 0..128 {
                assert_eq!(*p.add(i), 0);
            }
            segheap::release(p);

            let overflowed = segheap::zero_alloc(usize::MAX, 2);
            assert!(overflowed.is_null());
        }
    })
}

#[test]
fn resize_null_pointer_behaves_like_alloc() {
    locked!({
        unsafe {
            let p = segheap::resize(core::ptr::null_mut(), 48);
            assert!(!p.is_null());
            segheap::release(p);
        }
    })
}

#[test]
fn resize_to_zero_behaves_like_release() {
    locked!({
        unsafe {
            let p = segheap::alloc(48);
            assert!(!p.is_null());
            let q = segheap::resize(p, 0);
            assert!(q.is_null());
        }
    })
}

#[test]
fn randomized_alloc_free_resize_stress() {
    locked!({
        let mut rng: u64 = 0x9E3779B97F4A7C15;
        let mut next = || {
            rng ^= rng << 13;
            rng ^= rng >> 7;
            rng ^= rng << 17;
            rng
        };

        let mut slots = [core::ptr::null_mut::<u8>(); 256];
        for _ in 0..100_000 {
            let idx = (next() % 256) as usize;
            match next() % 3 {
                0 => unsafe {
                    if !slots[idx].is_null() {
                        segheap::release(slots[idx]);
                    }
                    let size = (next() % 128) as usize + 1;
                    slots[idx] = segheap::alloc(size);
                    assert!(!slots[idx].is_null());
                },
                1 => unsafe {
                    segheap::release(slots[idx]);
                    slots[idx] = core::ptr::null_mut();
                },
                _ => unsafe {
                    let size = (next() % 128) as usize + 1;
                    slots[idx] = segheap::resize(slots[idx], size);
                    assert!(!slots[idx].is_null());
                },
            }
        }

        unsafe {
            for &slot in slots.iter() {
                if !slot.is_null() {
                    segheap::release(slot);
                }
            }
        }
    })
}
