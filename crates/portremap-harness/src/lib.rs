//! Verification harness for the portremap `bind` interposer.
//!
//! This crate provides:
//! - Bind fixtures: JSON cases describing a requested port, an environment and
//!   the port the kernel should end up binding
//! - A runner that executes each case as a child process under `LD_PRELOAD`
//! - Structured JSONL logging and artifact indexing for verification runs

#![forbid(unsafe_code)]

pub mod diagnostics;
pub mod error;
pub mod fixtures;
pub mod probe;
pub mod runner;
pub mod structured_log;
pub mod verify;

pub use error::HarnessError;
pub use fixtures::{BindCase, BindFixtureSet};
pub use runner::TestRunner;
pub use verify::{VerificationResult, VerificationSummary};
