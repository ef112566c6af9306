//! Embedding reconciliation flow
//!
//! Polls every processing batch once. Completed batches have their
//! embeddings written by URL hash and are then marked completed; failed,
//! expired and cancelled batches are marked failed; anything else stays
//! processing for the next run. Each batch is handled in isolation, and a
//! batch that is no longer processing is never touched again.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::service::{BatchEmbeddingService, EmbeddingError, RemoteBatchStatus};
use crate::scraping::retry::{RetryError, RetryPolicy, Transient};
use crate::storage::{JobStore, PendingBatchStore, StoreError};
use crate::types::{BatchStatus, PendingBatch};

/// What happened to one batch during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResolution {
    /// Results applied and the batch marked completed
    Completed { written: usize, skipped: usize, failed: usize },
    /// Marked failed
    Failed { reason: String },
    /// Still running remotely, or unreachable this time
    StillProcessing { status: String },
    /// Already resolved by an earlier run
    AlreadyResolved(BatchStatus),
}

/// Totals for one reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_processing: usize,
    /// Embeddings written to jobs
    pub embeddings_written: usize,
    /// Results whose job was missing or already embedded
    pub embeddings_skipped: usize,
    /// Per-job writes that errored
    pub update_failures: usize,
    /// Batches whose handling hit a store error
    pub errors: usize,
}

impl ReconcileReport {
    fn record(&mut self, resolution: &BatchResolution) {
        match resolution {
            BatchResolution::Completed { written, skipped, failed } => {
                self.completed += 1;
                self.embeddings_written += written;
                self.embeddings_skipped += skipped;
                self.update_failures += failed;
            }
            BatchResolution::Failed { .. } => self.failed += 1,
            BatchResolution::StillProcessing { .. } => self.still_processing += 1,
            BatchResolution::AlreadyResolved(_) => {}
        }
    }
}

/// Applies finished batches to the job store
pub struct Reconciler {
    service: Arc<dyn BatchEmbeddingService>,
    jobs: Arc<dyn JobStore>,
    pending: Arc<dyn PendingBatchStore>,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        service: Arc<dyn BatchEmbeddingService>,
        jobs: Arc<dyn JobStore>,
        pending: Arc<dyn PendingBatchStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            service,
            jobs,
            pending,
            retry,
        }
    }

    /// Check every processing batch once
    pub async fn reconcile(&self) -> Result<ReconcileReport, StoreError> {
        let batches = self.pending.processing().await?;
        let mut report = ReconcileReport::default();
        if batches.is_empty() {
            debug!("No pending embedding batches");
            return Ok(report);
        }

        for batch in &batches {
            report.checked += 1;
            match self.reconcile_batch(&batch.batch_id).await {
                Ok(resolution) => report.record(&resolution),
                Err(e) => {
                    error!(batch_id = %batch.batch_id, "Reconciliation failed: {}", e);
                    report.errors += 1;
                }
            }
        }

        info!(
            "Reconciled {} batches: {} completed, {} failed, {} processing, {} embeddings written, {} update failures",
            report.checked,
            report.completed,
            report.failed,
            report.still_processing,
            report.embeddings_written,
            report.update_failures
        );
        Ok(report)
    }

    /// Resolve one batch. Idempotent: a batch no longer processing is left alone.
    pub async fn reconcile_batch(&self, batch_id: &str) -> Result<BatchResolution, StoreError> {
        let current: PendingBatch = self
            .pending
            .get(batch_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(batch_id.to_string()))?;
        if current.status != BatchStatus::Processing {
            debug!(batch_id = %batch_id, "Already {}", current.status);
            return Ok(BatchResolution::AlreadyResolved(current.status));
        }

        let report = match self.retry.run(|_| self.service.get_status(batch_id)).await {
            Ok(report) => report,
            Err(e) => return self.service_error(batch_id, e).await,
        };
        debug!(
            batch_id = %batch_id,
            "Status {} ({}/{} completed, {} failed)",
            report.status, report.counts.completed, report.counts.total, report.counts.failed
        );

        match report.status {
            RemoteBatchStatus::Completed => self.apply_results(batch_id).await,
            status if status.is_failure() => {
                warn!(batch_id = %batch_id, "Batch ended as {}", status);
                self.pending.transition(batch_id, BatchStatus::Failed).await?;
                Ok(BatchResolution::Failed {
                    reason: status.to_string(),
                })
            }
            status => Ok(BatchResolution::StillProcessing {
                status: status.to_string(),
            }),
        }
    }

    async fn apply_results(&self, batch_id: &str) -> Result<BatchResolution, StoreError> {
        let results = match self.retry.run(|_| self.service.get_results(batch_id)).await {
            Ok(results) => results,
            Err(e) => return self.service_error(batch_id, e).await,
        };

        let (mut written, mut skipped, mut failed) = (0, 0, 0);
        for (url_hash, embedding) in &results {
            match self.jobs.update_embedding(url_hash, embedding).await {
                Ok(true) => written += 1,
                Ok(false) => {
                    debug!(batch_id = %batch_id, "No unembedded job for {}", url_hash);
                    skipped += 1;
                }
                Err(e) => {
                    warn!(batch_id = %batch_id, "Failed to store embedding for {}: {}", url_hash, e);
                    failed += 1;
                }
            }
        }

        self.pending.transition(batch_id, BatchStatus::Completed).await?;
        info!(
            batch_id = %batch_id,
            "Applied {} embeddings ({} skipped, {} failed)", written, skipped, failed
        );
        Ok(BatchResolution::Completed { written, skipped, failed })
    }

    /// Transient trouble leaves the batch for the next run; anything else fails it
    async fn service_error(
        &self,
        batch_id: &str,
        err: RetryError<EmbeddingError>,
    ) -> Result<BatchResolution, StoreError> {
        if err.error().is_transient() {
            warn!(batch_id = %batch_id, "Embedding service unavailable: {}", err);
            return Ok(BatchResolution::StillProcessing {
                status: "unreachable".to_string(),
            });
        }
        error!(batch_id = %batch_id, "Embedding service rejected batch: {}", err);
        self.pending.transition(batch_id, BatchStatus::Failed).await?;
        Ok(BatchResolution::Failed {
            reason: err.into_error().to_string(),
        })
    }
}
