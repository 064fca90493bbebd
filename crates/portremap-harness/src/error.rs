//! Harness error type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("preload library not found: {0}")]
    MissingPreload(PathBuf),
    #[error("probe for case '{case}' produced no report (exit={exit_code:?}): {stderr}")]
    Probe {
        case: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("fixture case '{case}': {message}")]
    Fixture { case: String, message: String },
}
