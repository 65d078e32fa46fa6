//! Error types for collaborator calls.

use thiserror::Error;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by the external collaborators.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected the call: {0}")]
    Rejected(String),

    #[error("sql error: {0}")]
    Sql(String),

    #[error("clone utility error: {0}")]
    CloneUtility(String),

    #[error("i/o error: {0}")]
    Io(String),
}
