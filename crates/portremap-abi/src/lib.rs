// The only extern "C" export receives raw pointers from C callers and forwards
// them to libc unchanged; per-function safety docs would repeat the C contract.
#![allow(clippy::missing_safety_doc)]
//! # portremap-abi
//!
//! `LD_PRELOAD` interposer for `bind(2)`.
//!
//! This crate produces a `cdylib` (`libportremap_abi.so`) exporting a single
//! symbol, `bind`. Loaded ahead of libc, it sees every bind the host process
//! makes and redirects the two well-known RustyDB listener ports when the
//! matching environment variable names a replacement.
//!
//! # Architecture
//!
//! ```text
//! host bind() -> socket_abi::bind -> real_bind::next_bind (once)
//!                                 -> interpose::route_bind -> plan (portremap-core)
//!                                 -> next bind(), original or stack copy
//! ```
//!
//! ```sh
//! LD_PRELOAD=target/release/libportremap_abi.so RUSTYDB_PORT=15432 rustydb-server
//! ```

pub mod interpose;
pub mod real_bind;
pub mod util;

// Not compiled into the unit-test binary, where an exported `bind` would
// capture the binds made by the tests themselves.
#[cfg(not(test))]
pub mod socket_abi;
