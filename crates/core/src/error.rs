//! Error type shared by every fallible index operation.

use thiserror::Error;

/// Errors returned by index, persistence, and optimizer operations.
///
/// Validation errors are detected before any mutation, so an `Err` from a
/// mutating call leaves the index exactly as it was.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Vector or query length does not match the configured dimension.
    #[error("invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    /// Property value or enum code rejected at construction time.
    #[error("invalid property: {0}")]
    InvalidProperty(String),

    /// Unknown or already-removed id, or an index without a backing path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state is malformed.
    #[error("corrupt format: {0}")]
    CorruptFormat(String),

    /// The optimizer could not reach the requested accuracy band.
    #[error("unconverged: {0}")]
    Unconverged(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn dimension(expected: usize, actual: usize) -> Self {
        IndexError::InvalidDimension { expected, actual }
    }

    pub(crate) fn missing_object(id: u32) -> Self {
        IndexError::NotFound(format!("object {id} does not exist or was already removed"))
    }
}
