//! Shared internal utilities for the ABI layer.
//!
//! Everything here must be callable from inside a foreign process at any
//! point after load: no allocation, no locks, no Rust I/O machinery.

use std::ffi::c_int;

/// Reads the calling thread's `errno`.
#[inline]
pub fn errno() -> c_int {
    // SAFETY: __errno_location returns this thread's errno slot.
    unsafe { *libc::__errno_location() }
}

/// Overwrites the calling thread's `errno`.
#[inline]
pub fn set_errno(val: c_int) {
    // SAFETY: see `errno`.
    unsafe { *libc::__errno_location() = val };
}

/// Writes `bytes` to fd 2 with raw `write(2)` calls.
///
/// Retries on `EINTR` and short writes; silently gives up on any other
/// failure. Leaves `errno` as it found it.
pub fn write_stderr(bytes: &[u8]) {
    let saved = errno();
    let mut rest = bytes;
    while !rest.is_empty() {
        // SAFETY: `rest` is a live slice for the duration of the call.
        let n = unsafe { libc::write(libc::STDERR_FILENO, rest.as_ptr().cast(), rest.len()) };
        if n < 0 {
            if errno() == libc::EINTR {
                continue;
            }
            break;
        }
        if n == 0 {
            break;
        }
        rest = &rest[n as usize..];
    }
    set_errno(saved);
}

/// Reports an unrecoverable integrity failure and aborts the process.
pub fn fatal(msg: &[u8]) -> ! {
    write_stderr(msg);
    // SAFETY: abort never returns and has no preconditions.
    unsafe { libc::abort() }
}
