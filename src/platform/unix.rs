//! POSIX backend for the platform layer: `sbrk` for the program break,
//! `mmap`/`munmap` for independent anonymous regions.

use super::{Platform, PlatformError};

/// Stateless handle onto the process program break and mmap facilities.
///
/// Carries no fields: the program break and the set of live mappings are
/// process-wide OS state, not something this type owns or caches.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPlatform;

impl Platform for UnixPlatform {
    fn brk_current(&self) -> *mut u8 {
        // sbrk(0) queries the break without moving it.
        unsafe { libc::sbrk(0) as *mut u8 }
    }

    fn brk_extend(&self, delta: usize) -> Result<*mut u8, PlatformError> {
        let delta = isize::try_from(delta).map_err(|_| PlatformError::BrkExhausted)?;
        let prev = unsafe { libc::sbrk(delta) };
        if prev as isize == -1 {
            Err(PlatformError::BrkExhausted)
        } else {
            Ok(prev as *mut u8)
        }
    }

    fn map_anon(&self, size: usize) -> Result<*mut u8, PlatformError> {
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            Err(PlatformError::MapRejected)
        } else {
            Ok(ptr as *mut u8)
        }
    }

    unsafe fn unmap(&self, ptr: *mut u8, size: usize) {
        libc::munmap(ptr as *mut libc::c_void, size);
    }
}
