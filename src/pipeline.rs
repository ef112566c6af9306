//! Worker entry points
//!
//! Each stage runs as its own short-lived worker invoked by a scheduler:
//! publishing stale companies, scraping the company queue, draining job
//! batches into the embedding buffer, and reconciling submitted batches.
//! [`Pipeline`] opens the durable stores and queue under the data directory
//! once and hands them to whichever stage runs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::embedding::{
    BatchEmbeddingService, EmbeddingBatcher, OpenAiBatchClient, OpenAiBatchConfig, ReconcileReport, Reconciler,
};
use crate::filter::{FilterCounts, JobFilter};
use crate::queue::{CompanyQueue, Consumer, JobBatchQueue, JournalQueue, MessageQueue, TopicStats};
use crate::scraping::{CoordinatorConfig, FetchConfig, FetchEngine, PageFetcher, RetryPolicy, ScrapeCoordinator, ScrapeStats};
use crate::storage::{CompanyRegistry, CompanyStore, JobRegistry, PendingBatchLedger};
use crate::types::JobBatchMessage;

/// Publish every active company that is due for a scrape, oldest first.
///
/// Returns how many companies were queued.
pub async fn publish_stale_companies(
    store: &dyn CompanyStore,
    queue: &CompanyQueue,
    max_age: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<usize> {
    let companies = store
        .stale_companies(max_age, now)
        .await
        .context("Failed to load stale companies")?;
    if companies.is_empty() {
        info!("No stale companies to scrape");
        return Ok(0);
    }

    for company in &companies {
        queue
            .publish(company)
            .await
            .with_context(|| format!("Failed to publish company {}", company.page_url))?;
        debug!(company = %company.name, "Queued for scraping");
    }
    info!("Published {} stale companies", companies.len());
    Ok(companies.len())
}

/// Totals for one embed drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub messages: usize,
    /// Undecodable messages dropped from the queue
    pub dropped: usize,
    /// Messages handed back after a store error
    pub requeued: usize,
    pub filtered: FilterCounts,
    pub inserted: usize,
    pub skipped: usize,
    pub submitted_batches: Vec<String>,
    /// Items still buffered because a submission failed
    pub left_buffered: usize,
}

/// Drain the job-batch queue into `batcher` until it stays idle for
/// `idle_timeout` or `shutdown` fires, then flush the buffer.
///
/// A message is acked once its jobs are persisted; submission happens
/// afterwards, so a failed submission never causes redelivery. A broker
/// failure ends the drain early, but the buffer is still flushed before the
/// error is returned: those jobs are already stored and a redelivery would
/// only count them as skipped.
pub async fn drain_job_batches(
    batcher: &mut EmbeddingBatcher,
    queue: &JobBatchQueue,
    prefetch: usize,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<DrainReport> {
    let mut consumer = queue.consume(prefetch).await.context("Failed to consume job batches")?;
    let mut report = DrainReport::default();

    let outcome = drain_messages(batcher, queue, consumer.as_mut(), idle_timeout, &shutdown, &mut report).await;
    if let Err(e) = &outcome {
        error!("Job batch drain stopped early: {:#}", e);
    }

    // End of drain: nothing may stay in memory past this run
    match batcher.flush().await {
        Ok(ids) => report.submitted_batches.extend(ids),
        Err(e) => warn!("Final flush failed, {} jobs left for backfill: {}", batcher.buffered(), e),
    }
    report.left_buffered = batcher.buffered();

    info!(
        "Embed drain done: {} messages, {} inserted, {} skipped, filtered [{}], {} batches submitted",
        report.messages,
        report.inserted,
        report.skipped,
        report.filtered,
        report.submitted_batches.len()
    );
    outcome.map(|()| report)
}

async fn drain_messages(
    batcher: &mut EmbeddingBatcher,
    queue: &JobBatchQueue,
    consumer: &mut dyn Consumer,
    idle_timeout: Duration,
    shutdown: &CancellationToken,
    report: &mut DrainReport,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            next = consumer.next(idle_timeout) => next.context("Job batch consumer failed")?,
        };
        let Some(delivery) = next else {
            debug!("Job batch queue idle for {:?}", idle_timeout);
            return Ok(());
        };
        report.messages += 1;

        let message: JobBatchMessage = match delivery.decode() {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable job batch {}: {}", delivery.handle.message_id, e);
                queue
                    .nack(&delivery.handle, false)
                    .await
                    .context("Failed to drop undecodable job batch")?;
                report.dropped += 1;
                continue;
            }
        };

        match batcher.accept(message).await {
            Ok(accepted) => {
                report.filtered.merge(&accepted.filtered);
                report.inserted += accepted.inserted;
                report.skipped += accepted.skipped;
                queue
                    .ack(&delivery.handle)
                    .await
                    .with_context(|| format!("Failed to ack job batch {}", delivery.handle.message_id))?;
            }
            Err(e) => {
                warn!("Failed to persist job batch {}: {}; requeueing", delivery.handle.message_id, e);
                report.requeued += 1;
                queue
                    .nack(&delivery.handle, true)
                    .await
                    .context("Failed to requeue job batch")?;
                continue;
            }
        }

        match batcher.submit_ready().await {
            Ok(ids) => report.submitted_batches.extend(ids),
            Err(e) => warn!("Batch submission failed, keeping {} jobs buffered: {}", batcher.buffered(), e),
        }
    }
}

/// Durable stores and queue opened from one [`Config`]
pub struct Pipeline {
    config: Config,
    broker: JournalQueue,
    jobs: Arc<JobRegistry>,
    companies: Arc<CompanyRegistry>,
    pending: Arc<PendingBatchLedger>,
}

impl Pipeline {
    /// Open every store under the configured data directory
    pub fn open(config: Config) -> Result<Self> {
        let data = &config.data;
        std::fs::create_dir_all(&data.data_dir)
            .with_context(|| format!("Failed to create data directory {}", data.data_dir.display()))?;

        let broker = JournalQueue::open(
            data.queue_journal(),
            config.queue.lease_timeout(),
            config.queue.poll_interval(),
        )
        .context("Failed to open queue journal")?;
        let jobs = JobRegistry::open(data.jobs_log()).context("Failed to open job store")?;
        let companies = CompanyRegistry::open(data.companies_log()).context("Failed to open company store")?;
        let pending = PendingBatchLedger::open(data.pending_batches_log()).context("Failed to open batch ledger")?;

        info!("Data directory: {}", data.data_dir.display());
        Ok(Self {
            config,
            broker,
            jobs: Arc::new(jobs),
            companies: Arc::new(companies),
            pending: Arc::new(pending),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn companies(&self) -> &Arc<CompanyRegistry> {
        &self.companies
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    pub fn pending(&self) -> &Arc<PendingBatchLedger> {
        &self.pending
    }

    /// Ready and in-flight counts for one queue topic
    pub fn queue_stats(&self, topic: &str) -> Option<TopicStats> {
        self.broker.stats(topic)
    }

    fn broker(&self) -> Arc<dyn MessageQueue> {
        Arc::new(self.broker.clone())
    }

    fn embedding_service(&self) -> Result<Arc<dyn BatchEmbeddingService>> {
        let client = OpenAiBatchClient::new(OpenAiBatchConfig::from_config(&self.config.embedding))
            .context("Failed to create embedding client")?;
        Ok(Arc::new(client))
    }

    /// Queue every company due for a scrape
    pub async fn publish_stale(&self) -> Result<usize> {
        let queue = CompanyQueue::connect_companies(self.broker()).await?;
        publish_stale_companies(
            self.companies.as_ref(),
            &queue,
            self.config.companies.max_age(),
            Utc::now(),
        )
        .await
    }

    /// Drain the company queue with the HTTP fetcher
    pub async fn scrape(&self, shutdown: CancellationToken) -> Result<ScrapeStats> {
        let fetcher = FetchEngine::new(FetchConfig::from_config(&self.config.scraping))
            .context("Failed to create fetch engine")?;
        self.scrape_with(Arc::new(fetcher), shutdown).await
    }

    /// Drain the company queue with any fetcher
    pub async fn scrape_with(&self, fetcher: Arc<dyn PageFetcher>, shutdown: CancellationToken) -> Result<ScrapeStats> {
        let coordinator = Arc::new(ScrapeCoordinator::new(
            CoordinatorConfig::from_config(&self.config.scraping, &self.config.queue, &self.config.filter),
            fetcher,
            self.jobs.clone(),
            self.companies.clone(),
            CompanyQueue::connect_companies(self.broker()).await?,
            JobBatchQueue::connect_job_batches(self.broker()).await?,
        ));
        let stats = coordinator.run(shutdown).await?;
        self.broker.compact()?;
        Ok(stats)
    }

    /// Drain job batches into embedding batches.
    ///
    /// With `backfill`, stored jobs that still lack an embedding are buffered
    /// first.
    pub async fn embed(&self, backfill: bool, shutdown: CancellationToken) -> Result<DrainReport> {
        let service = self.embedding_service()?;
        self.embed_with(service, backfill, shutdown).await
    }

    pub async fn embed_with(
        &self,
        service: Arc<dyn BatchEmbeddingService>,
        backfill: bool,
        shutdown: CancellationToken,
    ) -> Result<DrainReport> {
        let mut batcher = EmbeddingBatcher::new(
            service,
            self.jobs.clone(),
            self.pending.clone(),
            JobFilter::new(self.config.filter.clone()),
            self.config.embedding.batch_threshold,
        );
        if backfill {
            batcher.backfill_unembedded(self.config.embedding.backfill_limit).await?;
        }
        let queue = JobBatchQueue::connect_job_batches(self.broker()).await?;
        let report = drain_job_batches(
            &mut batcher,
            &queue,
            self.config.queue.job_prefetch,
            self.config.queue.idle_timeout(),
            shutdown,
        )
        .await?;
        self.broker.compact()?;
        Ok(report)
    }

    /// Apply every finished embedding batch
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let service = self.embedding_service()?;
        self.reconcile_with(service).await
    }

    pub async fn reconcile_with(&self, service: Arc<dyn BatchEmbeddingService>) -> Result<ReconcileReport> {
        let reconciler = Reconciler::new(
            service,
            self.jobs.clone(),
            self.pending.clone(),
            RetryPolicy::new(self.config.scraping.max_attempts, self.config.scraping.retry_backoff),
        );
        Ok(reconciler.reconcile().await?)
    }
}
