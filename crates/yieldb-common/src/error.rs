//! Error types for yieldb

use thiserror::Error;

/// Result type alias for yieldb operations
pub type Result<T> = std::result::Result<T, YieldbError>;

/// Unified error type for all yieldb operations
///
/// Variants fall into two groups. Argument errors are returned by the
/// operation method itself, before any deferred work exists. Operation
/// errors come out of the deferred value (or a stream's `Err` item) once it
/// is driven.
#[derive(Error, Debug, Clone)]
pub enum YieldbError {
    // Argument errors

    #[error("missing selector")]
    MissingSelector,

    #[error("missing update")]
    MissingUpdate,

    #[error("Invalid insert: {0}")]
    InvalidInsert(String),

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Operation errors

    /// Error reported by the driver, kept intact
    #[cfg(feature = "mongodb-errors")]
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl YieldbError {
    /// Returns true for errors raised while validating call arguments
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            YieldbError::MissingSelector
                | YieldbError::MissingUpdate
                | YieldbError::InvalidInsert(_)
                | YieldbError::InvalidPipeline(_)
                | YieldbError::InvalidOptions(_)
                | YieldbError::Validation(_)
        )
    }
}
