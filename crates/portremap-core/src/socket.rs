//! Socket address constants and `sockaddr_in` layout.
//!
//! Only what the interposer needs to recognise an IPv4 bind request. Actual
//! syscall invocations live in the ABI crate.

// ---------------------------------------------------------------------------
// Address families (AF_*)
// ---------------------------------------------------------------------------

/// Unspecified address family.
pub const AF_UNSPEC: i32 = 0;
/// Unix domain sockets.
pub const AF_UNIX: i32 = 1;
/// IPv4 Internet protocols.
pub const AF_INET: i32 = 2;
/// IPv6 Internet protocols.
pub const AF_INET6: i32 = 10;

// ---------------------------------------------------------------------------
// sockaddr_in layout (Linux)
// ---------------------------------------------------------------------------

/// Size of `struct sockaddr_in`.
pub const SOCKADDR_IN_LEN: usize = 16;
/// Byte offset of `sin_family` (`sa_family_t`, host byte order).
pub const SIN_FAMILY_OFFSET: usize = 0;
/// Byte offset of `sin_port` (network byte order).
pub const SIN_PORT_OFFSET: usize = 2;
/// Byte offset of `sin_addr`.
pub const SIN_ADDR_OFFSET: usize = 4;

/// Returns `true` if `addrlen` is large enough to hold a `sockaddr_in`.
#[inline]
pub fn holds_sockaddr_in(addrlen: usize) -> bool {
    addrlen >= SOCKADDR_IN_LEN
}

/// Reads the address family from raw `sockaddr` bytes.
///
/// Returns `None` when fewer than two bytes are available.
#[inline]
pub fn family_of(bytes: &[u8]) -> Option<i32> {
    let raw = bytes.get(SIN_FAMILY_OFFSET..SIN_FAMILY_OFFSET + 2)?;
    Some(i32::from(u16::from_ne_bytes([raw[0], raw[1]])))
}

/// Reads `sin_port` from raw `sockaddr_in` bytes, in host byte order.
#[inline]
pub fn port_of(bytes: &[u8; SOCKADDR_IN_LEN]) -> u16 {
    u16::from_be_bytes([bytes[SIN_PORT_OFFSET], bytes[SIN_PORT_OFFSET + 1]])
}
