//! jobsift: job-posting scraping and embedding pipeline
//!
//! Moves work through durable queues in stages:
//! - stale companies are queued for scraping
//! - a bounded worker pool fetches each careers page, extracts and validates
//!   jobs, and publishes the new ones as a single batch
//! - job batches are filtered, persisted, and buffered for batch embedding
//! - finished embedding batches are reconciled into the job store

pub mod config;
pub mod embedding;
pub mod filter;
pub mod pipeline;
pub mod queue;
pub mod scraping;
pub mod storage;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;
