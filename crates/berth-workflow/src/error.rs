//! Error taxonomy for the orchestrator.
//!
//! Everything here is fatal to the step (or request) that raised it; the
//! only local recovery in the system is a step re-emitting itself on
//! "not ready yet", which is not an error path.

use thiserror::Error;

/// Result type alias for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors raised by workflow steps and the request-facing operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("database {0} not found")]
    NotFound(String),

    #[error("no shared capacity: can't find a host to create a schema for {0}")]
    Capacity(String),

    #[error("host {0} not found")]
    HostNotFound(String),

    #[error("creation request for {0} carries no source database id")]
    MissingCloneSource(String),

    #[error("database {database_id} is {status}, which is not a valid state for this operation")]
    InvalidState {
        database_id: String,
        status: String,
    },

    #[error("instance class {0} is not in the configured catalog")]
    UnknownInstanceClass(String),

    #[error("deletion failed for {database_id}: {message}")]
    Deletion {
        database_id: String,
        message: String,
    },

    #[error("operator token is not authorized")]
    Forbidden,

    #[error(transparent)]
    Envelope(#[from] berth_envelope::EnvelopeError),

    #[error(transparent)]
    Fleet(#[from] berth_fleet::FleetError),

    #[error(transparent)]
    Schema(#[from] berth_schema::SchemaError),

    #[error(transparent)]
    State(#[from] berth_state::StateError),

    #[error(transparent)]
    Queue(#[from] berth_queue::QueueError),
}
