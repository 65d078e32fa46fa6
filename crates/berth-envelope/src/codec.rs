//! Wire codec: versioned seal/open of serializable payloads.
//!
//! The version tag lives outside the ciphertext and is checked first; an
//! unknown or missing version is rejected before any cipher work happens.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::envelope::{Envelope, Sealed};
use crate::error::{EnvelopeError, EnvelopeResult};

/// The current envelope protocol version.
pub const PROTOCOL_VERSION: &str = "v1";

/// What actually rides the queue: `{version, iv, ciphertext}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    pub version: String,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Serialize a payload to JSON and encrypt it under the current protocol
/// version.
pub fn seal<T: Serialize>(envelope: &Envelope, payload: &T) -> EnvelopeResult<SealedMessage> {
    let json = serde_json::to_vec(payload).map_err(|e| {
        error!(error = %e, "payload failed to serialize for sealing");
        EnvelopeError::Serde(e.to_string())
    })?;
    let sealed = envelope.encrypt(&json)?;
    Ok(SealedMessage {
        version: PROTOCOL_VERSION.to_string(),
        iv: sealed.iv,
        ciphertext: sealed.ciphertext,
    })
}

/// Check the version gate, decrypt, and deserialize a payload.
///
/// `version` is `None` when the incoming message carried no version
/// attribute at all.
pub fn open<T: DeserializeOwned>(
    envelope: &Envelope,
    version: Option<&str>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
) -> EnvelopeResult<T> {
    match version {
        None => return Err(EnvelopeError::MissingVersion),
        Some(PROTOCOL_VERSION) => {}
        Some(other) => return Err(EnvelopeError::UnknownVersion(other.to_string())),
    }

    let plain = envelope.decrypt(&Sealed { iv, ciphertext })?;
    serde_json::from_slice(&plain).map_err(|e| {
        error!(error = %e, "decrypted payload failed to deserialize");
        EnvelopeError::Serde(e.to_string())
    })
}
