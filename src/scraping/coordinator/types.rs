//! Coordinator types: configuration, per-company outcomes, and statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::{DelayRange, FilterConfig, QueueConfig, ScrapingConfig};
use crate::scraping::retry::RetryPolicy;

/// Configuration for the scrape coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Concurrent workers
    pub workers: usize,
    /// Capacity of the in-process buffer between feeder and workers
    pub buffer_capacity: usize,
    /// Unacknowledged company messages the feeder may hold
    pub prefetch: usize,
    /// The feeder stops after the queue stays empty this long
    pub idle_timeout: Duration,
    /// Fetch retry policy
    pub retry: RetryPolicy,
    /// Pause after every successful fetch
    pub politeness_delay: DelayRange,
    /// How long shutdown waits for workers before cancelling them
    pub shutdown_grace: Duration,
    /// Location marker the extractor writes; the job filter keys on it
    pub region_marker: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_config(&ScrapingConfig::default(), &QueueConfig::default(), &FilterConfig::default())
    }
}

impl CoordinatorConfig {
    /// Build from the TOML scraping, queue and filter sections.
    ///
    /// The buffer always holds at least one item per worker.
    pub fn from_config(scraping: &ScrapingConfig, queue: &QueueConfig, filter: &FilterConfig) -> Self {
        let workers = scraping.workers.max(1);
        Self {
            workers,
            buffer_capacity: scraping.buffer_capacity().max(workers),
            prefetch: queue.company_prefetch.max(1),
            idle_timeout: queue.idle_timeout(),
            retry: RetryPolicy::new(scraping.max_attempts, scraping.retry_backoff),
            politeness_delay: scraping.politeness_delay,
            shutdown_grace: scraping.shutdown_grace(),
            region_marker: filter.region_marker.clone(),
        }
    }
}

/// Terminal outcome of one company message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyOutcome {
    /// Page fetched and every new job published (possibly none)
    Scraped { published: usize, invalid: usize, duplicates: usize },
    /// Fetch gave up or the payload was unusable; the message is acked anyway
    Failed { error: String },
    /// Publishing failed; the message stays unacked for redelivery
    Deferred { error: String },
    /// Cancelled mid-item; the message was handed back to the queue
    Cancelled,
}

impl CompanyOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed { error: error.into() }
    }

    /// Whether the worker should ack the message
    pub fn should_ack(&self) -> bool {
        matches!(self, Self::Scraped { .. } | Self::Failed { .. })
    }
}

/// Result of processing one company
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub page_url: String,
    pub outcome: CompanyOutcome,
    pub duration: Duration,
}

impl ProcessResult {
    pub(crate) fn new(page_url: impl Into<String>, outcome: CompanyOutcome, start: Instant) -> Self {
        Self {
            page_url: page_url.into(),
            outcome,
            duration: start.elapsed(),
        }
    }
}

/// Snapshot of coordinator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Companies scraped successfully
    pub processed: u64,
    /// Companies given up on (fetch exhausted, permanent error, bad payload, panic)
    pub failed: u64,
    /// Companies left unacked for redelivery
    pub requeued: u64,
    /// Company pages that returned 404/410
    pub deactivated: u64,
    pub jobs_published: u64,
    pub invalid_jobs: u64,
    /// Jobs skipped because their URL was already stored
    pub duplicates: u64,
}

/// Lock-free counters shared by the workers
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    requeued: AtomicU64,
    deactivated: AtomicU64,
    jobs_published: AtomicU64,
    invalid_jobs: AtomicU64,
    duplicates: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record(&self, outcome: &CompanyOutcome) {
        match outcome {
            CompanyOutcome::Scraped {
                published,
                invalid,
                duplicates,
            } => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                self.jobs_published.fetch_add(*published as u64, Ordering::Relaxed);
                self.invalid_jobs.fetch_add(*invalid as u64, Ordering::Relaxed);
                self.duplicates.fetch_add(*duplicates as u64, Ordering::Relaxed);
            }
            CompanyOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            CompanyOutcome::Deferred { .. } | CompanyOutcome::Cancelled => {
                self.requeued.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_deactivated(&self) {
        self.deactivated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ScrapeStats {
        ScrapeStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            deactivated: self.deactivated.load(Ordering::Relaxed),
            jobs_published: self.jobs_published.load(Ordering::Relaxed),
            invalid_jobs: self.invalid_jobs.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}
