//! Batch embedding of persisted jobs
//!
//! Two independent flows share the pending-batch ledger: the
//! [`EmbeddingBatcher`] submits buffered jobs as batch jobs, and the
//! [`Reconciler`] later applies finished batches to the job store.
//!
//! # Example Configuration
//!
//! ## OpenAI API
//! ```toml
//! [embedding]
//! api_base = "https://api.openai.com/v1"
//! model = "text-embedding-3-small"
//! batch_threshold = 500
//! ```
//!
//! ## Self-hosted OpenAI-compatible gateway
//! ```toml
//! [embedding]
//! api_base = "http://localhost:8080/v1"
//! model = "nomic-embed-text-v1.5"
//! ```

pub mod batcher;
pub mod openai;
pub mod reconciler;
pub mod service;

pub use batcher::{AcceptReport, BatchError, BatcherStats, EmbeddingBatcher};
pub use openai::{OpenAiBatchClient, OpenAiBatchConfig};
pub use reconciler::{BatchResolution, ReconcileReport, Reconciler};
pub use service::{
    BatchCounts, BatchEmbeddingService, BatchItem, BatchStatusReport, EmbeddingError, EmbeddingResult,
    RemoteBatchStatus,
};
