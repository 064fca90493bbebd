//! # portremap-core
//!
//! Safe, allocation-free logic behind the `bind(2)` port interposer.
//!
//! This crate decides, for a single `bind` call, whether the requested IPv4
//! port should be redirected and to what. It never touches raw pointers; the
//! `portremap-abi` crate reads the caller's address structure, asks
//! [`redirect::plan`] for a route, and performs the forwarding.
//!
//! ```text
//! bind() -> ABI entry -> inspect_family -> plan(port, env) -> forward / rewrite copy
//! ```

#![deny(unsafe_code)]

pub mod dlfcn;
pub mod inet;
pub mod redirect;
pub mod socket;
