//! Counter store error types.

use thiserror::Error;

/// Infrastructure failures surfaced by counter backends.
///
/// Absence is never an error: `CounterStore::get` returns `None` for keys
/// that are missing or expired. Only connectivity and query failures reach
/// this type, and retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("Backend connection failed: {0}")]
    Connection(String),

    #[error("Operation failed for key '{key}': {reason}")]
    Operation { key: String, reason: String },
}

impl CounterStoreError {
    /// Attach the key to an operation failure for diagnosability.
    pub fn operation(key: &str, reason: impl ToString) -> Self {
        Self::Operation {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
