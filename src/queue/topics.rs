//! Typed wrappers over the two pipeline topics

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;

use super::{Consumer, DeliveryHandle, MessageQueue, QueueError};
use crate::types::{CompanyRecord, JobBatchMessage, JobRecord};

/// Companies waiting to be scraped
pub const COMPANY_TOPIC: &str = "companies_to_scrape";
/// Job batches waiting to be filtered, persisted and embedded
pub const JOB_BATCH_TOPIC: &str = "job_batches";

/// A declared topic carrying JSON-encoded `T`
pub struct TypedTopic<T> {
    queue: Arc<dyn MessageQueue>,
    topic: &'static str,
    _payload: PhantomData<fn(T)>,
}

impl<T> Clone for TypedTopic<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            topic: self.topic,
            _payload: PhantomData,
        }
    }
}

impl<T: Serialize> TypedTopic<T> {
    /// Declare the topic on the broker. Call again after a reconnect.
    pub async fn connect(queue: Arc<dyn MessageQueue>, topic: &'static str) -> Result<Self, QueueError> {
        queue.declare(topic).await?;
        Ok(Self {
            queue,
            topic,
            _payload: PhantomData,
        })
    }

    pub fn topic(&self) -> &'static str {
        self.topic
    }

    pub fn broker(&self) -> &Arc<dyn MessageQueue> {
        &self.queue
    }

    pub async fn publish(&self, payload: &T) -> Result<u64, QueueError> {
        let body = serde_json::to_string(payload)?;
        self.queue.publish(self.topic, body).await
    }

    pub async fn consume(&self, prefetch: usize) -> Result<Box<dyn Consumer>, QueueError> {
        self.queue.consume(self.topic, prefetch).await
    }

    pub async fn ack(&self, handle: &DeliveryHandle) -> Result<(), QueueError> {
        self.queue.ack(handle).await
    }

    pub async fn nack(&self, handle: &DeliveryHandle, requeue: bool) -> Result<(), QueueError> {
        self.queue.nack(handle, requeue).await
    }
}

pub type CompanyQueue = TypedTopic<CompanyRecord>;
pub type JobBatchQueue = TypedTopic<JobBatchMessage>;

impl TypedTopic<CompanyRecord> {
    pub async fn connect_companies(queue: Arc<dyn MessageQueue>) -> Result<Self, QueueError> {
        Self::connect(queue, COMPANY_TOPIC).await
    }
}

impl TypedTopic<JobBatchMessage> {
    pub async fn connect_job_batches(queue: Arc<dyn MessageQueue>) -> Result<Self, QueueError> {
        Self::connect(queue, JOB_BATCH_TOPIC).await
    }

    /// Publish every job found on one page as a single ordered message
    pub async fn publish_batch(&self, jobs: Vec<JobRecord>, source_url: &str) -> Result<u64, QueueError> {
        self.publish(&JobBatchMessage {
            jobs,
            source_url: source_url.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JournalQueue;
    use std::time::Duration;

    #[tokio::test]
    async fn test_company_topic_round_trip() {
        let broker: Arc<dyn MessageQueue> = Arc::new(JournalQueue::in_memory(
            Duration::from_secs(30),
            Duration::from_millis(10),
        ));
        let companies = CompanyQueue::connect_companies(broker).await.unwrap();
        let acme = CompanyRecord::new("Acme", "comeet.com", "https://www.comeet.com/jobs/acme/1");
        companies.publish(&acme).await.unwrap();

        let mut consumer = companies.consume(1).await.unwrap();
        let delivery = consumer.next(Duration::from_millis(50)).await.unwrap().unwrap();
        let decoded: CompanyRecord = delivery.decode().unwrap();
        assert_eq!(decoded, acme);
        assert!(delivery.payload.contains("pageUrl"));
        companies.ack(&delivery.handle).await.unwrap();
    }
}
