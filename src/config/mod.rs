//! Configuration for the jobsift workers

mod data;
mod embedding;
mod filter;
mod logging;
mod queue;
mod scraping;

pub use data::DataConfig;
pub use embedding::{EmbeddingConfig, API_KEY_ENV};
pub use filter::{FilterConfig, DEFAULT_REGION_MARKER};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use queue::QueueConfig;
pub use scraping::{CompaniesConfig, DelayRange, ScrapingConfig, DEFAULT_USER_AGENTS};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration, built once at process start and handed to each component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory
    #[serde(default)]
    pub data: DataConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Durable queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Scrape coordinator configuration
    #[serde(default)]
    pub scraping: ScrapingConfig,
    /// Job filter rules
    #[serde(default)]
    pub filter: FilterConfig,
    /// Batch embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Company scheduling
    #[serde(default)]
    pub companies: CompaniesConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Validate all configuration fields.
    ///
    /// Every violation is collected and reported in one error.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.data.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }

        // Queue
        if self.queue.company_prefetch == 0 {
            errors.push("company_prefetch must be positive".to_string());
        }
        if self.queue.job_prefetch == 0 {
            errors.push("job_prefetch must be positive".to_string());
        }
        if self.queue.lease_timeout_secs == 0 {
            errors.push("lease_timeout_secs must be positive".to_string());
        }
        if self.queue.poll_interval_ms == 0 {
            errors.push("poll_interval_ms must be positive".to_string());
        }

        // Scraping
        if self.scraping.workers == 0 {
            errors.push("workers must be positive".to_string());
        }
        if self.scraping.buffer_multiplier == 0 {
            errors.push("buffer_multiplier must be positive".to_string());
        }
        if self.scraping.max_attempts == 0 {
            errors.push("max_attempts must be positive".to_string());
        }
        if self.scraping.fetch_timeout_secs == 0 {
            errors.push("fetch_timeout_secs must be positive".to_string());
        }
        if self.scraping.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            errors.push("user_agents must contain at least one entry".to_string());
        }
        if !self.scraping.retry_backoff.is_valid() {
            errors.push("retry_backoff min_ms must be <= max_ms".to_string());
        }
        if !self.scraping.politeness_delay.is_valid() {
            errors.push("politeness_delay min_ms must be <= max_ms".to_string());
        }

        // Filter
        if self.filter.max_script_ratio <= 0.0 || self.filter.max_script_ratio > 1.0 {
            errors.push("max_script_ratio must be between 0.0 (exclusive) and 1.0".to_string());
        }
        if self.filter.script_range_start > self.filter.script_range_end {
            errors.push("script_range_start must not be after script_range_end".to_string());
        }
        if self.filter.region_marker.trim().is_empty() {
            errors.push("region_marker must not be empty".to_string());
        }

        // Embedding
        if self.embedding.batch_threshold == 0 {
            errors.push("batch_threshold must be positive".to_string());
        }
        if self.embedding.model.trim().is_empty() {
            errors.push("embedding model must not be empty".to_string());
        }
        if url::Url::parse(&self.embedding.api_base).is_err() {
            errors.push(format!(
                "embedding api_base is not a valid URL: {}",
                self.embedding.api_base
            ));
        }

        // Companies
        if self.companies.max_age_hours <= 0 {
            errors.push("max_age_hours must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
