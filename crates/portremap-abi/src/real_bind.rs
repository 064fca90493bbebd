//! Lazy, exactly-once resolution of the next `bind` in the symbol search order.
//!
//! The pointer is resolved on the first intercepted call and then kept for the
//! life of the process. Every call, redirected or not, goes through it.

use std::ffi::{c_int, c_void};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize, Ordering};

use portremap_core::dlfcn;

/// Signature of `bind(2)`.
pub type BindFn = unsafe extern "C" fn(c_int, *const libc::sockaddr, libc::socklen_t) -> c_int;

// Symbol lifecycle states.
const STATE_UNRESOLVED: u8 = 0;
const STATE_RESOLVING: u8 = 1;
const STATE_READY: u8 = 2;

/// A symbol address resolved at most once, shared by all threads.
///
/// UNRESOLVED -> RESOLVING -> READY. One thread wins the CAS and runs the
/// resolver; every other first caller spins until READY and then reads the
/// published pointer. A failed resolution drops back to UNRESOLVED.
pub struct OnceSymbol {
    state: AtomicU8,
    ptr: AtomicPtr<c_void>,
    resolutions: AtomicUsize,
    name: &'static [u8],
}

impl OnceSymbol {
    /// `name` must be NUL-terminated.
    pub const fn new(name: &'static [u8]) -> Self {
        Self {
            state: AtomicU8::new(STATE_UNRESOLVED),
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            resolutions: AtomicUsize::new(0),
            name,
        }
    }

    /// Returns the cached address, running `resolve` if nobody has yet.
    ///
    /// `resolve` receives the NUL-terminated symbol name and returns null on
    /// failure.
    pub fn get_or_resolve(
        &self,
        resolve: impl FnOnce(&[u8]) -> *mut c_void,
    ) -> Option<NonNull<c_void>> {
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_READY => return NonNull::new(self.ptr.load(Ordering::Acquire)),
                STATE_RESOLVING => {
                    std::hint::spin_loop();
                    std::thread::yield_now();
                }
                _ => {
                    if self
                        .state
                        .compare_exchange(
                            STATE_UNRESOLVED,
                            STATE_RESOLVING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_err()
                    {
                        continue;
                    }
                    // We own the resolution.
                    let addr = resolve(self.name);
                    self.resolutions.fetch_add(1, Ordering::Relaxed);
                    if addr.is_null() {
                        self.state.store(STATE_UNRESOLVED, Ordering::Release);
                        return None;
                    }
                    self.ptr.store(addr, Ordering::Release);
                    self.state.store(STATE_READY, Ordering::Release);
                    return NonNull::new(addr);
                }
            }
        }
    }

    /// How many times the resolver has run.
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn is_resolved(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_READY
    }
}

static NEXT_BIND: OnceSymbol = OnceSymbol::new(dlfcn::BIND_SYMBOL);

fn dlsym_next(name: &[u8]) -> *mut c_void {
    debug_assert!(dlfcn::valid_symbol_name(name));
    // SAFETY: `name` is a NUL-terminated static string.
    unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr().cast()) }
}

/// The `bind` that would have been called had this library not been preloaded.
///
/// Aborts the process if the dynamic linker cannot find one.
pub fn next_bind() -> BindFn {
    match NEXT_BIND.get_or_resolve(dlsym_next) {
        // SAFETY: dlsym returned the address of libc's `bind`, whose
        // signature is exactly `BindFn`.
        Some(addr) => unsafe { std::mem::transmute::<*mut c_void, BindFn>(addr.as_ptr()) },
        None => crate::util::fatal(dlfcn::ERR_NEXT_BIND_MISSING),
    }
}

/// Number of times the process-wide `bind` resolution has run (0 or 1).
pub fn resolution_count() -> usize {
    NEXT_BIND.resolutions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    static MARKER: u8 = 0;

    fn marker() -> *mut c_void {
        (&raw const MARKER).cast_mut().cast()
    }

    #[test]
    fn resolves_once_and_caches() {
        let sym = OnceSymbol::new(b"marker\0");
        assert!(!sym.is_resolved());

        let first = sym.get_or_resolve(|_| marker());
        let second = sym.get_or_resolve(|_| panic!("resolver must not run twice"));

        assert_eq!(first.map(NonNull::as_ptr), Some(marker()));
        assert_eq!(first, second);
        assert_eq!(sym.resolutions(), 1);
        assert!(sym.is_resolved());
    }

    #[test]
    fn resolver_receives_symbol_name() {
        let sym = OnceSymbol::new(b"bind\0");
        let mut seen = Vec::new();
        let _ = sym.get_or_resolve(|name| {
            seen.extend_from_slice(name);
            marker()
        });
        assert_eq!(seen, b"bind\0");
    }

    #[test]
    fn failed_resolution_is_not_cached() {
        let sym = OnceSymbol::new(b"missing\0");
        assert!(sym.get_or_resolve(|_| std::ptr::null_mut()).is_none());
        assert!(!sym.is_resolved());

        let retry = sym.get_or_resolve(|_| marker());
        assert_eq!(retry.map(NonNull::as_ptr), Some(marker()));
        assert_eq!(sym.resolutions(), 2);
    }

    #[test]
    fn concurrent_first_use_resolves_once() {
        const THREADS: usize = 16;
        for _ in 0..50 {
            let sym: &'static OnceSymbol = Box::leak(Box::new(OnceSymbol::new(b"race\0")));
            let barrier = Arc::new(Barrier::new(THREADS));
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        sym.get_or_resolve(|_| {
                            std::thread::yield_now();
                            marker()
                        })
                        .map(|p| p.as_ptr() as usize)
                    })
                })
                .collect();

            for handle in handles {
                assert_eq!(handle.join().unwrap(), Some(marker() as usize));
            }
            assert_eq!(sym.resolutions(), 1);
        }
    }

    #[test]
    fn next_bind_resolves_libc_bind() {
        let real = next_bind();
        assert_eq!(resolution_count(), 1);
        assert_eq!(next_bind() as usize, real as usize);
        assert_eq!(resolution_count(), 1);
    }
}
