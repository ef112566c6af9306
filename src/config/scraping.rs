//! Scraping and company-scheduling configuration

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User agents rotated per request
pub const DEFAULT_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Inclusive range a randomized sleep is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// A zero-length range, handy in tests
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn is_valid(&self) -> bool {
        self.min_ms <= self.max_ms
    }

    /// Draw a delay uniformly from the range
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

/// Scrape coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Concurrent workers in the pool
    pub workers: usize,
    /// Work buffer capacity is `workers * buffer_multiplier`
    pub buffer_multiplier: usize,
    /// Per-attempt fetch timeout (seconds)
    pub fetch_timeout_secs: u64,
    /// User agents rotated per request
    pub user_agents: Vec<String>,
    /// Fetch attempts before a company is given up on
    pub max_attempts: u32,
    /// Sleep between fetch attempts
    pub retry_backoff: DelayRange,
    /// Sleep after every successful fetch
    pub politeness_delay: DelayRange,
    /// How long in-flight workers get to finish after the buffer drains (seconds)
    pub shutdown_grace_secs: u64,
}

impl ScrapingConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn buffer_capacity(&self) -> usize {
        self.workers.saturating_mul(self.buffer_multiplier).max(1)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            buffer_multiplier: 2,
            fetch_timeout_secs: 10,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            max_attempts: 3,
            retry_backoff: DelayRange::new(1000, 2000),
            politeness_delay: DelayRange::new(1000, 3000),
            shutdown_grace_secs: 30,
        }
    }
}

/// Company re-scrape scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompaniesConfig {
    /// A company is stale once its last scrape is older than this
    pub max_age_hours: i64,
}

impl CompaniesConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_age_hours)
    }
}

impl Default for CompaniesConfig {
    fn default() -> Self {
        Self { max_age_hours: 24 }
    }
}
