//! Dynamic linking: symbol names and error messages.
//!
//! The actual `dlsym` call lives in the ABI crate. Everything here is a
//! NUL-terminated byte string so it can be handed to C or `write(2)` as-is.

/// Name of the intercepted primitive, as passed to `dlsym`.
pub const BIND_SYMBOL: &[u8] = b"bind\0";

/// Written to stderr right before aborting when the next `bind` is missing.
pub const ERR_NEXT_BIND_MISSING: &[u8] =
    b"[port_override] fatal: unable to resolve next bind symbol\n";

/// Returns `true` if `name` is a usable C symbol name: non-empty, exactly one
/// trailing NUL and no interior NUL.
#[inline]
pub fn valid_symbol_name(name: &[u8]) -> bool {
    match name.split_last() {
        Some((&0, body)) => !body.is_empty() && !body.contains(&0),
        _ => false,
    }
}
