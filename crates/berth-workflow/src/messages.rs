//! Continuation messages and their queue encoding.
//!
//! Both workflows carry their continuation state inside the encrypted
//! envelope; on the queue a message is three attributes: a plaintext
//! `version` string plus binary `iv` and `payload`. The message body is a
//! fixed placeholder; nothing identifying rides outside the ciphertext.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use berth_envelope::{Envelope, EnvelopeError, open, seal};
use berth_queue::{AttributeValue, QueueMessage};
use berth_state::CreationRequest;

/// Queue attribute names.
pub const VERSION_ATTRIBUTE: &str = "version";
pub const IV_ATTRIBUTE: &str = "iv";
pub const PAYLOAD_ATTRIBUTE: &str = "payload";

/// Fixed message body; all meaning lives in the attributes.
pub const MESSAGE_BODY: &str = "berth-workflow-step";

/// Steps of the creation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreationStep {
    /// Request a dedicated host (dedicated tenancy only).
    Instance,
    /// Poll the host until it is ready; self-loops.
    InstanceReady,
    /// Provision the schema and tenant role.
    Schema,
    /// Seed the new schema from a source database.
    Clone,
}

/// Steps of the deletion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionStep {
    /// Poll until the host is strictly available; self-loops.
    Preparing,
    /// Rotate the host master password, revoking the old credential.
    Deleting,
    /// Poll until ready again, then hand the new password to the schema
    /// role; self-loops.
    ResettingPassword,
}

/// Creation continuation: the database identity, its password, where the
/// state machine is, and the original immutable request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationMessage {
    pub database_id: String,
    pub password: String,
    pub step: CreationStep,
    pub request: CreationRequest,
}

/// Deletion continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionMessage {
    pub database_id: String,
    pub step: DeletionStep,
    pub password: String,
}

/// Seal a payload into the three queue attributes.
pub fn encode_attributes<T: Serialize>(
    envelope: &Envelope,
    payload: &T,
) -> Result<HashMap<String, AttributeValue>, EnvelopeError> {
    let sealed = seal(envelope, payload)?;
    Ok(HashMap::from([
        (
            VERSION_ATTRIBUTE.to_string(),
            AttributeValue::String(sealed.version),
        ),
        (IV_ATTRIBUTE.to_string(), AttributeValue::Binary(sealed.iv)),
        (
            PAYLOAD_ATTRIBUTE.to_string(),
            AttributeValue::Binary(sealed.ciphertext),
        ),
    ]))
}

/// Decode a received queue message back into a payload. The version gate
/// runs before any cipher work.
pub fn decode_attributes<T: DeserializeOwned>(
    envelope: &Envelope,
    message: &QueueMessage,
) -> Result<T, EnvelopeError> {
    let version = message
        .attributes
        .get(VERSION_ATTRIBUTE)
        .and_then(|a| a.as_str());
    let iv = message
        .attributes
        .get(IV_ATTRIBUTE)
        .and_then(|a| a.as_bytes())
        .ok_or_else(|| EnvelopeError::Malformed("missing iv attribute".to_string()));
    let payload = message
        .attributes
        .get(PAYLOAD_ATTRIBUTE)
        .and_then(|a| a.as_bytes())
        .ok_or_else(|| EnvelopeError::Malformed("missing payload attribute".to_string()));

    // Version first: a missing or foreign version must win over any
    // complaint about the binary attributes.
    match version {
        None => return Err(EnvelopeError::MissingVersion),
        Some(v) if v != berth_envelope::PROTOCOL_VERSION => {
            return Err(EnvelopeError::UnknownVersion(v.to_string()));
        }
        Some(_) => {}
    }

    open(envelope, version, iv?.to_vec(), payload?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_state::{Locality, Tenancy};

    fn request() -> CreationRequest {
        CreationRequest {
            category: "acme".to_string(),
            tenancy: Tenancy::Shared,
            locality: Locality::Us,
            instance_class: None,
            instance_storage_gb: None,
            source_database_id: None,
            service_tag: "acme".to_string(),
            service_component_tag: "acme-api".to_string(),
            highly_available: false,
        }
    }

    fn queue_message(attributes: HashMap<String, AttributeValue>) -> QueueMessage {
        QueueMessage {
            body: MESSAGE_BODY.to_string(),
            attributes,
            receipt: "r-0".to_string(),
        }
    }

    #[test]
    fn creation_message_round_trips_through_attributes() {
        let envelope = Envelope::derive("open sesame", "sel gris");
        let message = CreationMessage {
            database_id: "acme_1a2b".to_string(),
            password: "p4ss".to_string(),
            step: CreationStep::Schema,
            request: request(),
        };

        let attributes = encode_attributes(&envelope, &message).unwrap();
        let decoded: CreationMessage =
            decode_attributes(&envelope, &queue_message(attributes)).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn steps_serialize_screaming() {
        assert_eq!(
            serde_json::to_string(&CreationStep::InstanceReady).unwrap(),
            "\"INSTANCE_READY\""
        );
        assert_eq!(
            serde_json::to_string(&DeletionStep::ResettingPassword).unwrap(),
            "\"RESETTING_PASSWORD\""
        );
    }

    #[test]
    fn missing_version_beats_missing_binary_attributes() {
        let envelope = Envelope::derive("open sesame", "sel gris");
        let err = decode_attributes::<CreationMessage>(&envelope, &queue_message(HashMap::new()))
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingVersion));
    }

    #[test]
    fn unknown_version_rejected_without_cipher_work() {
        // Uninitialized envelope: any cipher work would raise KeyMaterial.
        let envelope = Envelope::uninitialized();
        let attributes = HashMap::from([
            (
                VERSION_ATTRIBUTE.to_string(),
                AttributeValue::String("v7".to_string()),
            ),
            (IV_ATTRIBUTE.to_string(), AttributeValue::Binary(vec![0; 16])),
            (
                PAYLOAD_ATTRIBUTE.to_string(),
                AttributeValue::Binary(vec![0; 16]),
            ),
        ]);
        let err = decode_attributes::<CreationMessage>(&envelope, &queue_message(attributes))
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::UnknownVersion(v) if v == "v7"));
    }
}
