//! Forwarding glue between the exported `bind` and the next one in line.
//!
//! [`route_bind`] takes the next `bind`, the environment lookup and the
//! diagnostic sink as arguments, so tests can drive the exact code path the
//! exported symbol uses with a recording stand-in for libc.

use std::ffi::c_int;
use std::mem::{MaybeUninit, size_of};

use portremap_core::inet;
use portremap_core::redirect::{self, BindRoute, DiagnosticLine, Passthrough};
use portremap_core::socket::SOCKADDR_IN_LEN;

use crate::real_bind::BindFn;
use crate::util;

/// Plans the route for a caller's `(addr, addrlen)` without touching anything
/// past `addrlen` bytes.
///
/// # Safety
///
/// `addr` must be null or valid for reads of `addrlen` bytes.
pub unsafe fn plan_bind<L, V>(
    addr: *const libc::sockaddr,
    addrlen: libc::socklen_t,
    lookup: L,
) -> BindRoute
where
    L: FnOnce(&'static str) -> Option<V>,
    V: AsRef<[u8]>,
{
    if addr.is_null() {
        return BindRoute::Forward(Passthrough::NullAddress);
    }
    let len = addrlen as usize;
    // SAFETY: caller guarantees `addrlen` readable bytes; we look at most at
    // the first SOCKADDR_IN_LEN of them.
    let view = unsafe { std::slice::from_raw_parts(addr.cast::<u8>(), len.min(SOCKADDR_IN_LEN)) };
    redirect::plan_sockaddr(view, len, lookup)
}

/// Routes one `bind` call: forwards `addr` untouched, or forwards a private
/// stack copy whose port has been rewritten.
///
/// The caller's structure is never written. `errno` as seen by the caller is
/// whatever `next` leaves behind.
///
/// # Safety
///
/// Same contract as `bind(2)`: `addr` must be null or valid for reads of
/// `addrlen` bytes. `next` must behave like `bind(2)`.
pub unsafe fn route_bind<L, V, E>(
    sockfd: c_int,
    addr: *const libc::sockaddr,
    addrlen: libc::socklen_t,
    lookup: L,
    emit: E,
    next: BindFn,
) -> c_int
where
    L: FnOnce(&'static str) -> Option<V>,
    V: AsRef<[u8]>,
    E: FnOnce(&DiagnosticLine),
{
    let saved_errno = util::errno();
    let route = unsafe { plan_bind(addr, addrlen, lookup) };
    let BindRoute::Redirect(directive) = route else {
        util::set_errno(saved_errno);
        return unsafe { next(sockfd, addr, addrlen) };
    };

    // sockaddr_storage is the largest address the kernel accepts, so copying
    // min(addrlen, its size) keeps every byte the kernel will read in our copy.
    let mut copy = MaybeUninit::<libc::sockaddr_storage>::zeroed();
    let copy_len = (addrlen as usize).min(size_of::<libc::sockaddr_storage>());
    // SAFETY: `addr` is readable for `addrlen >= copy_len` bytes (planning
    // only redirects full sockaddr_in structures) and `copy` is a distinct
    // stack object of at least `copy_len` bytes.
    unsafe {
        std::ptr::copy_nonoverlapping(addr.cast::<u8>(), copy.as_mut_ptr().cast::<u8>(), copy_len);
        let sin = copy.as_mut_ptr().cast::<libc::sockaddr_in>();
        (*sin).sin_port = inet::htons(directive.replacement_port);
    }

    emit(&directive.diagnostic());
    util::set_errno(saved_errno);
    unsafe { next(sockfd, copy.as_ptr().cast::<libc::sockaddr>(), addrlen) }
}

/// Environment lookup used by the exported symbol: the live process
/// environment, read on every call.
pub fn process_env(name: &'static str) -> Option<Vec<u8>> {
    use std::os::unix::ffi::OsStringExt;
    std::env::var_os(name).map(|v| v.into_vec())
}

/// Diagnostic sink used by the exported symbol.
pub fn emit_stderr(line: &DiagnosticLine) {
    util::write_stderr(line.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use portremap_core::redirect::{API_PORT, DATABASE_PORT, DATABASE_PORT_VAR};
    use portremap_core::socket::AF_INET;

    fn sockaddr_in(port: u16) -> libc::sockaddr_in {
        libc::sockaddr_in {
            sin_family: AF_INET as libc::sa_family_t,
            sin_port: inet::htons(port),
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes([127, 0, 0, 1]),
            },
            sin_zero: [0; 8],
        }
    }

    fn as_sockaddr(sin: &libc::sockaddr_in) -> *const libc::sockaddr {
        (sin as *const libc::sockaddr_in).cast()
    }

    #[test]
    fn null_address_is_forwarded() {
        let route = unsafe { plan_bind(std::ptr::null(), 16, |_| Some("5433")) };
        assert_eq!(route, BindRoute::Forward(Passthrough::NullAddress));
    }

    #[test]
    fn plan_reads_port_in_host_order() {
        let sin = sockaddr_in(DATABASE_PORT);
        let route = unsafe {
            plan_bind(as_sockaddr(&sin), size_of::<libc::sockaddr_in>() as u32, |name| {
                (name == DATABASE_PORT_VAR).then_some("5433")
            })
        };
        assert_eq!(route.replacement_port(), Some(5433));
    }

    #[test]
    fn plan_respects_addrlen() {
        let sin = sockaddr_in(DATABASE_PORT);
        let route = unsafe { plan_bind(as_sockaddr(&sin), 4, |_| Some("5433")) };
        assert_eq!(route, BindRoute::Forward(Passthrough::ShortAddress(4)));
    }

    #[test]
    fn unrecognized_port_skips_lookup() {
        let sin = sockaddr_in(API_PORT + 1);
        let mut looked_up = false;
        let route = unsafe {
            plan_bind(as_sockaddr(&sin), 16, |_| {
                looked_up = true;
                Some("1")
            })
        };
        assert!(!route.is_redirect());
        assert!(!looked_up);
    }
}
