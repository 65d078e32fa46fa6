//! Queue message model and the `WorkQueue` trait.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::QueueResult;

/// A named message attribute: string or binary, like the cloud queues
/// the contract abstracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            Self::String(_) => None,
        }
    }
}

/// One delivered message. The receipt handle identifies this delivery
/// (not the message): redelivery of the same message carries a fresh
/// receipt.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub body: String,
    pub attributes: HashMap<String, AttributeValue>,
    pub receipt: String,
}

/// The queue contract the pollers consume.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a message.
    async fn send(
        &self,
        body: &str,
        attributes: HashMap<String, AttributeValue>,
    ) -> QueueResult<()>;

    /// Receive up to `max` currently visible messages. Received messages
    /// become invisible until acknowledged or their visibility timeout
    /// lapses.
    async fn receive(&self, max: usize) -> QueueResult<Vec<QueueMessage>>;

    /// Acknowledge (delete) a delivery by receipt handle.
    async fn ack(&self, receipt: &str) -> QueueResult<()>;
}
