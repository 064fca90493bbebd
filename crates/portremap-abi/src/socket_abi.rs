//! ABI layer for `<sys/socket.h>`: the exported `bind`.
//!
//! Signature and return/errno behavior are identical to libc's. Only the
//! effective port of a redirected IPv4 bind differs.

use std::ffi::c_int;

use crate::{interpose, real_bind};

// ---------------------------------------------------------------------------
// bind
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn bind(
    sockfd: c_int,
    addr: *const libc::sockaddr,
    addrlen: libc::socklen_t,
) -> c_int {
    let next = real_bind::next_bind();
    unsafe {
        interpose::route_bind(
            sockfd,
            addr,
            addrlen,
            interpose::process_env,
            interpose::emit_stderr,
            next,
        )
    }
}
