//! Error types for Vigil
//!
//! Two layers of errors live here:
//!
//! - [`DurabilityError`] is what a durability target reports from a flush or
//!   checkpoint. The background writer decides from it whether to retry on the
//!   next tick or give up.
//! - [`VigilError`] is the engine-facing error returned by database
//!   operations (open, commit, close, configuration).
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for durability target operations
pub type DurabilityResult<T> = std::result::Result<T, DurabilityError>;

/// Result type alias for engine operations
pub type VigilResult<T> = std::result::Result<T, VigilError>;

/// Failure raised by a flush or checkpoint.
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// I/O error while forcing the log or writing a checkpoint
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unexpected runtime failure inside the target
    #[error("Internal error: {0}")]
    Internal(String),

    /// The log or checkpoint state is corrupt; retrying cannot help
    #[error("Data corruption: {0}")]
    Corruption(String),
}

impl DurabilityError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        DurabilityError::Internal(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        DurabilityError::Corruption(msg.into())
    }

    /// Whether the next scheduled attempt may succeed.
    ///
    /// I/O and internal failures are transient from the scheduler's point of
    /// view. Corruption is not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DurabilityError::Corruption(_))
    }
}

/// Engine-level error
#[derive(Debug, Error)]
pub enum VigilError {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Flush or checkpoint failure surfaced to a caller
    #[error("Durability error: {0}")]
    Durability(#[from] DurabilityError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The database has already been closed
    #[error("Database '{0}' is closed")]
    Closed(String),
}

impl VigilError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        VigilError::Config(msg.into())
    }

    /// Create an invalid-operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        VigilError::InvalidOperation(msg.into())
    }
}
