//! Byte-order helpers.
//!
//! The ABI crate reads `sin_port` straight out of a `libc::sockaddr_in`, so it
//! needs the `<arpa/inet.h>` conversions without calling into libc.

/// Converts a 16-bit value from host byte order to network byte order (big-endian).
///
/// Equivalent to C `htons`.
#[inline]
pub fn htons(v: u16) -> u16 {
    v.to_be()
}

/// Converts a 16-bit value from network byte order to host byte order.
///
/// Equivalent to C `ntohs`.
#[inline]
pub fn ntohs(v: u16) -> u16 {
    u16::from_be(v)
}
