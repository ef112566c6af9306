//! Embedding submission flow
//!
//! Filtered jobs are persisted with no embedding and their text buffered in
//! memory. Whenever the buffer holds `threshold` items a batch is submitted,
//! its id recorded as processing, and those items dropped from the buffer.
//! A failed submission keeps the items buffered for the next attempt.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::service::{BatchEmbeddingService, BatchItem, EmbeddingError};
use crate::filter::{FilterCounts, JobFilter};
use crate::storage::{JobStore, PendingBatchStore, StoreError};
use crate::types::{JobBatchMessage, JobRecord};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("batch submission failed: {0}")]
    Submit(#[from] EmbeddingError),
}

/// What one accepted message contributed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptReport {
    pub filtered: FilterCounts,
    pub inserted: usize,
    /// Already stored (duplicate URL or URL hash)
    pub skipped: usize,
    pub buffered: usize,
}

/// Running totals across every message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherStats {
    pub messages: u64,
    pub filtered: FilterCounts,
    pub inserted: u64,
    pub skipped: u64,
    pub batches_submitted: u64,
    pub items_submitted: u64,
}

/// Accumulates jobs and submits them as embedding batches
pub struct EmbeddingBatcher {
    service: Arc<dyn BatchEmbeddingService>,
    jobs: Arc<dyn JobStore>,
    pending: Arc<dyn PendingBatchStore>,
    filter: JobFilter,
    threshold: usize,
    buffer: Vec<BatchItem>,
    stats: BatcherStats,
}

impl EmbeddingBatcher {
    pub fn new(
        service: Arc<dyn BatchEmbeddingService>,
        jobs: Arc<dyn JobStore>,
        pending: Arc<dyn PendingBatchStore>,
        filter: JobFilter,
        threshold: usize,
    ) -> Self {
        Self {
            service,
            jobs,
            pending,
            filter,
            threshold: threshold.max(1),
            buffer: Vec::new(),
            stats: BatcherStats::default(),
        }
    }

    /// Items waiting for submission
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> BatcherStats {
        self.stats
    }

    /// Filter, persist, and buffer one job batch.
    ///
    /// Jobs are buffered as soon as they are inserted, so a store error part
    /// way through loses nothing: redelivery sees the inserted jobs as
    /// duplicates and their items are already waiting here.
    pub async fn accept(&mut self, message: JobBatchMessage) -> Result<AcceptReport, BatchError> {
        self.stats.messages += 1;
        let total = message.jobs.len();
        let outcome = self.filter.apply(message.jobs);
        self.stats.filtered.merge(&outcome.counts);

        let mut report = AcceptReport {
            filtered: outcome.counts,
            ..Default::default()
        };
        for job in &outcome.kept {
            match self.jobs.insert_job(job).await? {
                Some(_) => {
                    report.inserted += 1;
                    self.stats.inserted += 1;
                    if self.push(job) {
                        report.buffered += 1;
                    }
                }
                None => {
                    report.skipped += 1;
                    self.stats.skipped += 1;
                }
            }
        }

        debug!(
            "Accepted {} jobs from {}: {} inserted, {} skipped, {} filtered",
            total,
            message.source_url,
            report.inserted,
            report.skipped,
            report.filtered.total()
        );
        Ok(report)
    }

    fn push(&mut self, job: &JobRecord) -> bool {
        let text = job.embedding_text();
        if text.is_empty() {
            return false;
        }
        self.buffer.push(BatchItem {
            id: job.url_hash.clone(),
            text,
        });
        true
    }

    /// Submit full batches while the buffer holds at least `threshold` items.
    /// Returns the ids of the submitted batches.
    pub async fn submit_ready(&mut self) -> Result<Vec<String>, BatchError> {
        let mut submitted = Vec::new();
        while self.buffer.len() >= self.threshold {
            submitted.push(self.submit_front(self.threshold).await?);
        }
        Ok(submitted)
    }

    /// Submit everything still buffered, in batches of at most `threshold`
    pub async fn flush(&mut self) -> Result<Vec<String>, BatchError> {
        let mut submitted = self.submit_ready().await?;
        if !self.buffer.is_empty() {
            submitted.push(self.submit_front(self.buffer.len()).await?);
        }
        Ok(submitted)
    }

    async fn submit_front(&mut self, count: usize) -> Result<String, BatchError> {
        let batch_id = self.service.submit_batch(&self.buffer[..count]).await?;
        if let Err(e) = self.pending.insert_pending(&batch_id).await {
            // Keep the items: resubmitting is harmless, an untracked batch is not recoverable
            warn!(batch_id = %batch_id, "Failed to record submitted batch: {}", e);
            return Err(e.into());
        }
        self.buffer.drain(..count);
        self.stats.batches_submitted += 1;
        self.stats.items_submitted += count as u64;
        info!(batch_id = %batch_id, "Submitted embedding batch of {} jobs", count);
        Ok(batch_id)
    }

    /// Buffer stored jobs that still have no embedding.
    ///
    /// Recovers items lost with an earlier process's in-memory buffer. Jobs
    /// already buffered are not added twice.
    pub async fn backfill_unembedded(&mut self, limit: usize) -> Result<usize, BatchError> {
        let known: HashSet<String> = self.buffer.iter().map(|item| item.id.clone()).collect();
        let mut added = 0;
        for job in self.jobs.jobs_without_embedding(limit).await? {
            if !known.contains(&job.url_hash) && self.push(&job) {
                added += 1;
            }
        }
        if added > 0 {
            info!("Backfilled {} jobs without embeddings", added);
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::service::{BatchStatusReport, EmbeddingResult};
    use crate::storage::{JobRegistry, PendingBatchLedger};
    use crate::scraping::validator::validate_job;
    use crate::types::{BatchStatus, Embedding, RawJob};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingService {
        batches: Mutex<Vec<Vec<BatchItem>>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl BatchEmbeddingService for RecordingService {
        async fn submit_batch(&self, items: &[BatchItem]) -> EmbeddingResult<String> {
            if *self.fail.lock() {
                return Err(EmbeddingError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            let mut batches = self.batches.lock();
            batches.push(items.to_vec());
            Ok(format!("batch_{}", batches.len()))
        }

        async fn get_status(&self, _batch_id: &str) -> EmbeddingResult<BatchStatusReport> {
            unreachable!("not polled by the batcher")
        }

        async fn get_results(&self, _batch_id: &str) -> EmbeddingResult<HashMap<String, Embedding>> {
            unreachable!("not polled by the batcher")
        }
    }

    fn israeli_job(n: usize) -> JobRecord {
        validate_job(&RawJob {
            title: Some(format!("Engineer {}", n)),
            url: Some(format!("https://www.comeet.com/jobs/acme/{}", n)),
            location: Some("Tel Aviv, ISRAEL".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn message(range: std::ops::Range<usize>) -> JobBatchMessage {
        JobBatchMessage {
            jobs: range.map(israeli_job).collect(),
            source_url: "https://www.comeet.com/jobs/acme/AB.001".to_string(),
        }
    }

    fn batcher(threshold: usize) -> (EmbeddingBatcher, Arc<RecordingService>, Arc<PendingBatchLedger>) {
        let service = Arc::new(RecordingService::default());
        let pending = Arc::new(PendingBatchLedger::in_memory());
        let batcher = EmbeddingBatcher::new(
            service.clone(),
            Arc::new(JobRegistry::in_memory()),
            pending.clone(),
            JobFilter::default(),
            threshold,
        );
        (batcher, service, pending)
    }

    #[tokio::test]
    async fn test_threshold_submission_keeps_remainder() {
        let (mut batcher, service, pending) = batcher(5);
        batcher.accept(message(0..3)).await.unwrap();
        assert!(batcher.submit_ready().await.unwrap().is_empty());
        batcher.accept(message(3..7)).await.unwrap();
        let ids = batcher.submit_ready().await.unwrap();

        assert_eq!(ids, vec!["batch_1".to_string()]);
        assert_eq!(batcher.buffered(), 2);
        assert_eq!(service.batches.lock()[0].len(), 5);
        let recorded = pending.get("batch_1").await.unwrap().unwrap();
        assert_eq!(recorded.status, BatchStatus::Processing);
    }

    #[tokio::test]
    async fn test_items_keyed_by_url_hash() {
        let (mut batcher, service, _) = batcher(1);
        batcher.accept(message(0..1)).await.unwrap();
        batcher.submit_ready().await.unwrap();
        let job = israeli_job(0);
        let batches = service.batches.lock();
        assert_eq!(batches[0][0].id, job.url_hash);
        assert_eq!(batches[0][0].text, "Engineer 0");
    }

    #[tokio::test]
    async fn test_duplicates_are_skipped_not_buffered() {
        let (mut batcher, _, _) = batcher(100);
        let first = batcher.accept(message(0..3)).await.unwrap();
        let again = batcher.accept(message(0..3)).await.unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(again.inserted, 0);
        assert_eq!(again.skipped, 3);
        assert_eq!(batcher.buffered(), 3);
    }

    #[tokio::test]
    async fn test_filtered_jobs_never_reach_the_store() {
        let (mut batcher, _, _) = batcher(100);
        let mut msg = message(0..2);
        msg.jobs[1].location = Some("Berlin".to_string());
        let report = batcher.accept(msg).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.filtered.total(), 1);
    }

    #[tokio::test]
    async fn test_failed_submission_keeps_buffer() {
        let (mut batcher, service, pending) = batcher(2);
        *service.fail.lock() = true;
        batcher.accept(message(0..3)).await.unwrap();
        assert!(matches!(batcher.submit_ready().await, Err(BatchError::Submit(_))));
        assert_eq!(batcher.buffered(), 3);
        assert!(pending.processing().await.unwrap().is_empty());

        *service.fail.lock() = false;
        let ids = batcher.flush().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(batcher.buffered(), 0);
        assert_eq!(batcher.stats().items_submitted, 3);
    }

    #[tokio::test]
    async fn test_backfill_skips_buffered_jobs() {
        let (mut batcher, _, _) = batcher(100);
        batcher.accept(message(0..4)).await.unwrap();
        assert_eq!(batcher.backfill_unembedded(10).await.unwrap(), 0);

        // A fresh batcher over the same store recovers everything
        let mut fresh = EmbeddingBatcher::new(
            Arc::new(RecordingService::default()),
            batcher.jobs.clone(),
            Arc::new(PendingBatchLedger::in_memory()),
            JobFilter::default(),
            100,
        );
        assert_eq!(fresh.backfill_unembedded(10).await.unwrap(), 4);
        assert_eq!(fresh.backfill_unembedded(2).await.unwrap(), 0);
        assert_eq!(fresh.buffered(), 4);
    }
}
