//! Import error types.

use thiserror::Error;

/// Errors raised by the legacy import.
///
/// Only `SkipLog` aborts a run; sink failures are recorded per row.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The auth directory could not be listed.
    #[error("auth directory unavailable: {0}")]
    Directory(String),

    /// A ledger write failed.
    #[error("ledger write failed: {0}")]
    Sink(String),

    /// The skip log could not be written.
    #[error("skip log write failed: {0}")]
    SkipLog(String),
}
