//! Durable work queue
//!
//! Two named topics carry work between stages: companies to scrape and
//! batches of freshly scraped jobs. Delivery is at-least-once: a consumer
//! holds a leased [`DeliveryHandle`] until it acks or nacks, and a lease that
//! runs out puts the message back on the ready queue.

pub mod journal;
pub mod topics;

pub use journal::{JournalQueue, TopicStats};
pub use topics::{CompanyQueue, JobBatchQueue, TypedTopic, COMPANY_TOPIC, JOB_BATCH_TOPIC};

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("topic '{0}' has not been declared")]
    UnknownTopic(String),

    #[error("lease on message {message_id} in '{topic}' expired or was already settled")]
    LeaseExpired { topic: String, message_id: u64 },

    #[error("journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("consumer closed")]
    Closed,
}

/// Proof of a lease on one in-flight message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHandle {
    pub topic: String,
    pub message_id: u64,
    /// 1 on first delivery, incremented on every redelivery
    pub delivery_count: u32,
    pub(crate) lease: u64,
}

/// A message handed to a consumer.
///
/// The consumer's prefetch permit belongs to the lease, not to this value:
/// dropping a delivery unsettled keeps the slot taken until the lease
/// expires.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: String,
    pub handle: DeliveryHandle,
}

impl Delivery {
    pub fn new(payload: String, handle: DeliveryHandle) -> Self {
        Self { payload, handle }
    }

    /// Decode the JSON payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    pub fn is_redelivery(&self) -> bool {
        self.handle.delivery_count > 1
    }
}

/// Broker operations
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Create the topic if it does not exist yet
    async fn declare(&self, topic: &str) -> Result<(), QueueError>;

    /// Persist a message; returns once it is durable
    async fn publish(&self, topic: &str, payload: String) -> Result<u64, QueueError>;

    /// Start consuming with at most `prefetch` unacknowledged deliveries
    async fn consume(&self, topic: &str, prefetch: usize) -> Result<Box<dyn Consumer>, QueueError>;

    /// Permanently remove a delivered message
    async fn ack(&self, handle: &DeliveryHandle) -> Result<(), QueueError>;

    /// Return a delivered message to the queue, or drop it
    async fn nack(&self, handle: &DeliveryHandle, requeue: bool) -> Result<(), QueueError>;
}

/// One consumer of a topic
#[async_trait]
pub trait Consumer: Send {
    /// Wait up to `timeout` for the next delivery.
    ///
    /// Waiting for a free prefetch permit does not count against the timeout.
    /// A permit frees up on ack, on nack, or when its lease expires.
    async fn next(&mut self, timeout: Duration) -> Result<Option<Delivery>, QueueError>;
}
