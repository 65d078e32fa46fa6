//! Error types for envelope operations.

use thiserror::Error;

/// Result type alias for envelope operations.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Errors that can occur sealing or opening an envelope. All of them are
/// fatal to the step carrying the message.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope passphrase and salt uninitialized on startup, encryption impossible")]
    KeyMaterial,

    #[error("no version was sent with the message; this can happen when an upgrade occurs while the message is in flight")]
    MissingVersion,

    #[error("unrecognized envelope version {0:?}; the messaging protocol was upgraded while the message was in flight")]
    UnknownVersion(String),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("cipher error: {0}")]
    Crypto(String),

    #[error("payload serialization error: {0}")]
    Serde(String),
}
