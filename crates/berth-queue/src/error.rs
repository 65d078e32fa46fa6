//! Error types for queue operations.

use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur talking to a work queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to enqueue message: {0}")]
    Send(String),

    #[error("failed to receive messages: {0}")]
    Receive(String),

    #[error("unknown receipt handle: {0}")]
    UnknownReceipt(String),
}
