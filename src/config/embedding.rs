//! Batch embedding service configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// OpenAI-compatible batch embedding configuration
///
/// ```toml
/// [embedding]
/// api_base = "https://api.openai.com/v1"
/// model = "text-embedding-3-small"
/// batch_threshold = 500
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of the API (files and batches endpoints hang off it)
    pub api_base: String,
    /// API key (optional, falls back to OPENAI_API_KEY)
    pub api_key: Option<String>,
    /// Embedding model name
    pub model: String,
    /// Buffered jobs that trigger a batch submission
    pub batch_threshold: usize,
    /// Completion window requested for each batch
    pub completion_window: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Upper bound on jobs loaded by a backfill run
    pub backfill_limit: usize,
}

impl EmbeddingConfig {
    /// Configured key, else the environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            batch_threshold: 500,
            completion_window: "24h".to_string(),
            timeout_secs: 60,
            backfill_limit: 1000,
        }
    }
}
