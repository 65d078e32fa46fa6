//! Error types for fleet operations.

use thiserror::Error;

/// Result type alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors that can occur managing hosts.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("host creation failed for {host_id}: {message}")]
    Creation { host_id: String, message: String },

    #[error("host deletion failed for {host_id}: {message}")]
    Deletion { host_id: String, message: String },

    #[error("cannot decrease allocated storage on host {0}")]
    StorageShrink(String),

    #[error("storage increase on host {0} must be at least 10 percent")]
    StorageGrowthBelowMinimum(String),

    #[error("no master credentials in the vault for host {0}")]
    MissingCredentials(String),

    #[error(transparent)]
    Provider(#[from] berth_provider::ProviderError),
}
