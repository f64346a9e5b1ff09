//! Common error types for autotag

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for autotag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error taxonomy shared by both passes.
///
/// Per-image failures from external services are deliberately *not* here;
/// those live in the client error enums and are recovered inside the pass
/// loops. Everything in this enum aborts the run (or the checkpoint attempt).
#[derive(Error, Debug)]
pub enum Error {
    /// Required input missing or unreadable at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger file exists but is not parseable
    #[error("Corrupt ledger at {path}: {source}")]
    CorruptLedger {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Ledger could not be persisted; the prior backup remains intact
    #[error("Failed to persist ledger to {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
