//! Batch embedding service trait definitions
//!
//! An external service computes embeddings for many texts at once: a batch
//! is submitted, polled until it reaches a terminal status, then its results
//! are downloaded keyed by the correlation id given at submission.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::scraping::retry::Transient;
use crate::types::Embedding;

/// Errors that can occur talking to the embedding service
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered with an error status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the API
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds, if provided by the API
        retry_after_ms: Option<u64>,
    },

    /// The API answered with something we cannot read
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Results were requested for a batch that has not completed
    #[error("Batch {batch_id} not complete, status: {status}")]
    NotReady { batch_id: String, status: RemoteBatchStatus },

    /// Nothing to submit
    #[error("Cannot create batch for empty item list")]
    EmptyBatch,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Transient for EmbeddingError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            Self::RateLimited { .. } => true,
            Self::InvalidResponse(_) | Self::NotReady { .. } | Self::EmptyBatch | Self::Config(_) => false,
        }
    }
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// One text to embed, correlated by `id` (a job's URL hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: String,
    pub text: String,
}

/// Lifecycle status reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteBatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl RemoteBatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::InProgress => "in_progress",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// The batch ended without usable results
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Expired | Self::Cancelled)
    }

    /// Not terminal yet; poll again later
    pub fn is_pending(&self) -> bool {
        !self.is_failure() && *self != Self::Completed
    }
}

impl fmt::Display for RemoteBatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request counts of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchCounts {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Answer to a status poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatusReport {
    pub status: RemoteBatchStatus,
    pub counts: BatchCounts,
}

/// External batch embedding collaborator
#[async_trait]
pub trait BatchEmbeddingService: Send + Sync {
    /// Submit one batch job; returns its id
    async fn submit_batch(&self, items: &[BatchItem]) -> EmbeddingResult<String>;

    async fn get_status(&self, batch_id: &str) -> EmbeddingResult<BatchStatusReport>;

    /// Embeddings of a completed batch keyed by item id
    async fn get_results(&self, batch_id: &str) -> EmbeddingResult<HashMap<String, Embedding>>;
}
