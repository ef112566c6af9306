//! Durable queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lease, prefetch and drain settings for the company and job-batch topics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Seconds a delivery may stay unacknowledged before it is redelivered
    pub lease_timeout_secs: u64,
    /// How often an idle consumer re-checks for ready messages (milliseconds)
    pub poll_interval_ms: u64,
    /// Outstanding deliveries per company-topic consumer
    pub company_prefetch: usize,
    /// Outstanding deliveries per job-batch-topic consumer
    pub job_prefetch: usize,
    /// A drain stops after this many seconds without a new message
    pub idle_timeout_secs: u64,
}

impl QueueConfig {
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_timeout_secs: 300,
            poll_interval_ms: 200,
            company_prefetch: 10,
            job_prefetch: 10,
            idle_timeout_secs: 5,
        }
    }
}
