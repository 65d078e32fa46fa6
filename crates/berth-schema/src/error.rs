//! Error types for schema and clone operations.

use thiserror::Error;

/// Result type alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors from tenant DDL or the clone utility.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema operation failed: {0}")]
    Operation(String),

    #[error("clone failed: {0}")]
    CloneFailed(String),
}
