//! In-memory work queue with visibility-timeout redelivery.
//!
//! Single-process stand-in for the cloud queue; used by tests and the
//! daemon's dev mode. At-least-once semantics: an unacknowledged delivery
//! returns to the visible queue once its deadline passes.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::queue::{AttributeValue, QueueMessage, WorkQueue};

#[derive(Clone)]
struct Stored {
    id: u64,
    body: String,
    attributes: HashMap<String, AttributeValue>,
}

struct Inner {
    visible: VecDeque<Stored>,
    /// receipt → (message, visibility deadline)
    inflight: HashMap<String, (Stored, Instant)>,
    next_id: u64,
    next_receipt: u64,
}

/// An in-memory at-least-once queue.
pub struct MemoryQueue {
    name: String,
    visibility: Duration,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, visibility: Duration) -> Self {
        Self {
            name: name.into(),
            visibility,
            inner: Mutex::new(Inner {
                visible: VecDeque::new(),
                inflight: HashMap::new(),
                next_id: 0,
                next_receipt: 0,
            }),
        }
    }

    /// Messages currently visible (test helper).
    pub async fn depth(&self) -> usize {
        self.inner.lock().await.visible.len()
    }

    /// Return expired in-flight deliveries to the visible queue.
    fn requeue_expired(inner: &mut Inner, now: Instant) {
        let expired: Vec<String> = inner
            .inflight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some((message, _)) = inner.inflight.remove(&receipt) {
                inner.visible.push_back(message);
            }
        }
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn send(
        &self,
        body: &str,
        attributes: HashMap<String, AttributeValue>,
    ) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.visible.push_back(Stored {
            id,
            body: body.to_string(),
            attributes,
        });
        debug!(queue = %self.name, message_id = id, "message enqueued");
        Ok(())
    }

    async fn receive(&self, max: usize) -> QueueResult<Vec<QueueMessage>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Self::requeue_expired(&mut inner, now);

        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(stored) = inner.visible.pop_front() else {
                break;
            };
            let receipt = format!("{}-{}", stored.id, inner.next_receipt);
            inner.next_receipt += 1;
            batch.push(QueueMessage {
                body: stored.body.clone(),
                attributes: stored.attributes.clone(),
                receipt: receipt.clone(),
            });
            inner
                .inflight
                .insert(receipt, (stored, now + self.visibility));
        }
        Ok(batch)
    }

    async fn ack(&self, receipt: &str) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.inflight.remove(receipt) {
            Some(_) => Ok(()),
            None => Err(QueueError::UnknownReceipt(receipt.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(step: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([(
            "step".to_string(),
            AttributeValue::String(step.to_string()),
        )])
    }

    #[tokio::test]
    async fn send_receive_ack() {
        let queue = MemoryQueue::new("create", Duration::from_secs(30));
        queue.send("db_1", attrs("SCHEMA")).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "db_1");
        assert_eq!(
            batch[0].attributes.get("step").and_then(|a| a.as_str()),
            Some("SCHEMA")
        );

        queue.ack(&batch[0].receipt).await.unwrap();
        assert!(queue.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unacked_message_redelivers_after_visibility_timeout() {
        let queue = MemoryQueue::new("create", Duration::from_millis(20));
        queue.send("db_1", attrs("SCHEMA")).await.unwrap();

        let first = queue.receive(10).await.unwrap();
        assert_eq!(first.len(), 1);
        // Invisible while in flight.
        assert!(queue.receive(10).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;

        let second = queue.receive(10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].body, "db_1");
        // Redelivery carries a fresh receipt.
        assert_ne!(first[0].receipt, second[0].receipt);
        // The stale receipt no longer acks.
        assert!(queue.ack(&first[0].receipt).await.is_err());
    }

    #[tokio::test]
    async fn receive_respects_batch_limit() {
        let queue = MemoryQueue::new("create", Duration::from_secs(30));
        for i in 0..5 {
            queue.send(&format!("db_{i}"), attrs("SCHEMA")).await.unwrap();
        }
        let batch = queue.receive(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.depth().await, 2);
    }

    #[tokio::test]
    async fn ack_unknown_receipt_errors() {
        let queue = MemoryQueue::new("create", Duration::from_secs(30));
        assert!(matches!(
            queue.ack("bogus").await,
            Err(QueueError::UnknownReceipt(_))
        ));
    }
}
