//! Persistence layer
//!
//! The pipeline talks to storage only through the traits below. The
//! file-backed implementations keep their state in memory behind a lock and
//! journal every mutation to an [`AppendLog`], so uniqueness checks and
//! inserts happen under one write lock.

pub mod companies;
pub mod jobs;
pub mod log;
pub mod pending;

pub use companies::CompanyRegistry;
pub use jobs::JobRegistry;
pub use log::AppendLog;
pub use pending::PendingBatchLedger;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::types::{BatchStatus, CompanyRecord, JobRecord, PendingBatch};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("batch {batch_id} cannot move from {from} to {to}")]
    InvalidTransition {
        batch_id: String,
        from: BatchStatus,
        to: BatchStatus,
    },
}

/// Job persistence keyed by URL, with `url_hash` as secondary unique key
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job; `None` when its URL or URL hash is already stored
    async fn insert_job(&self, job: &JobRecord) -> Result<Option<u64>, StoreError>;

    /// Jobs still waiting for an embedding, oldest first
    async fn jobs_without_embedding(&self, limit: usize) -> Result<Vec<JobRecord>, StoreError>;

    /// Set the embedding of the job with this URL hash.
    ///
    /// Returns false when no such job exists or it already has an embedding.
    async fn update_embedding(&self, url_hash: &str, embedding: &[f32]) -> Result<bool, StoreError>;

    /// Keep only the jobs whose URL is not stored yet, preserving order
    async fn filter_existing(&self, jobs: Vec<JobRecord>) -> Result<Vec<JobRecord>, StoreError>;
}

/// Company persistence keyed by page URL
#[async_trait]
pub trait CompanyStore: Send + Sync {
    /// Insert a company; false when its page URL is already known
    async fn insert_company(&self, company: CompanyRecord) -> Result<bool, StoreError>;

    /// Active companies never scraped or last scraped more than `max_age` ago,
    /// never-scraped first, then oldest scrape first
    async fn stale_companies(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<CompanyRecord>, StoreError>;

    async fn mark_scraped(&self, page_url: &str, at: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn mark_inactive(&self, page_url: &str) -> Result<bool, StoreError>;
}

/// Durable ledger of submitted embedding batches
#[async_trait]
pub trait PendingBatchStore: Send + Sync {
    /// Record a freshly submitted batch as processing; false if already recorded
    async fn insert_pending(&self, batch_id: &str) -> Result<bool, StoreError>;

    /// Batches still processing, oldest first
    async fn processing(&self) -> Result<Vec<PendingBatch>, StoreError>;

    async fn get(&self, batch_id: &str) -> Result<Option<PendingBatch>, StoreError>;

    /// Move a processing batch to a terminal status
    async fn transition(&self, batch_id: &str, to: BatchStatus) -> Result<(), StoreError>;
}
