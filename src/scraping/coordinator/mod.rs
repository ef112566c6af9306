//! Scrape coordinator: drains the company queue into a bounded worker pool
//!
//! A single feeder consumes company messages and forwards them, unmodified,
//! into an in-process buffer. Each worker takes one delivery at a time and runs
//! fetch → extract → validate → dedup → publish, then settles the delivery:
//! scraped and failed companies are acked, a failed publish is left unacked
//! for the lease to redeliver, and an item interrupted by cancellation is
//! nacked back onto the queue.

mod types;

pub use types::*;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::extractor::{absolutize_urls, JobExtractor};
use super::fetcher::PageFetcher;
use super::validator;
use crate::queue::{CompanyQueue, Consumer, Delivery, JobBatchQueue, QueueError};
use crate::storage::{CompanyStore, JobStore};
use crate::types::CompanyRecord;
use crate::util::truncate_str;

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Delivery>>>;

/// Scrape coordinator owning the worker pool and its collaborators
pub struct ScrapeCoordinator {
    config: CoordinatorConfig,
    fetcher: Arc<dyn PageFetcher>,
    /// Arc for spawn_blocking sharing
    extractor: Arc<JobExtractor>,
    jobs: Arc<dyn JobStore>,
    companies: Arc<dyn CompanyStore>,
    company_queue: CompanyQueue,
    batch_queue: JobBatchQueue,
    stats: StatsCounters,
}

impl ScrapeCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        fetcher: Arc<dyn PageFetcher>,
        jobs: Arc<dyn JobStore>,
        companies: Arc<dyn CompanyStore>,
        company_queue: CompanyQueue,
        batch_queue: JobBatchQueue,
    ) -> Self {
        let extractor = Arc::new(JobExtractor::with_region_marker(config.region_marker.clone()));
        Self {
            config,
            fetcher,
            extractor,
            jobs,
            companies,
            company_queue,
            batch_queue,
            stats: StatsCounters::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Current counters
    pub fn stats(&self) -> ScrapeStats {
        self.stats.snapshot()
    }

    /// Scrape one company and publish its new jobs.
    ///
    /// Never acks; the caller settles the delivery from the returned outcome.
    pub async fn process_company(&self, company: &CompanyRecord, cancel: &CancellationToken) -> ProcessResult {
        let start = Instant::now();
        let page_url = company.page_url.as_str();

        let fetched = tokio::select! {
            _ = cancel.cancelled() => {
                return ProcessResult::new(page_url, CompanyOutcome::Cancelled, start);
            }
            result = self.config.retry.run(|attempt| {
                debug!(company = %company.name, "Fetching {} (attempt {})", page_url, attempt);
                self.fetcher.fetch(page_url)
            }) => result,
        };

        let html = match fetched {
            Ok(html) => html,
            Err(e) => {
                error!(company = %company.name, "Giving up on {}: {}", page_url, e);
                if e.error().is_gone() {
                    match self.companies.mark_inactive(page_url).await {
                        Ok(_) => {
                            self.stats.record_deactivated();
                            info!(company = %company.name, "Marked company inactive");
                        }
                        Err(store_err) => warn!("Failed to deactivate {}: {}", page_url, store_err),
                    }
                }
                return ProcessResult::new(page_url, CompanyOutcome::failed(e.to_string()), start);
            }
        };

        let outcome = self.publish_jobs(company, html).await;

        // A deferred company keeps its old timestamp so it stays due
        if matches!(outcome, CompanyOutcome::Scraped { .. }) {
            if let Err(e) = self.companies.mark_scraped(page_url, Utc::now()).await {
                warn!("Failed to record scrape time for {}: {}", page_url, e);
            }
        }

        // Politeness pause before this worker fetches again
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.politeness_delay.sample()) => {}
        }

        ProcessResult::new(page_url, outcome, start)
    }

    async fn publish_jobs(&self, company: &CompanyRecord, html: String) -> CompanyOutcome {
        let page_url = company.page_url.as_str();

        // CPU-bound parsing stays off the async workers
        let extractor = Arc::clone(&self.extractor);
        let mut raw_jobs = match tokio::task::spawn_blocking(move || extractor.extract(&html)).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(company = %company.name, "Extraction task failed: {}", e);
                Vec::new()
            }
        };

        if let Ok(base) = Url::parse(page_url) {
            absolutize_urls(&mut raw_jobs, &base);
        }
        for job in &mut raw_jobs {
            if job.company_name.as_deref().is_none_or(|n| n.trim().is_empty()) {
                job.company_name = Some(company.name.clone());
            }
        }

        let (valid, invalid) = validator::validate(raw_jobs);
        let valid_count = valid.len();

        let new_jobs = match self.jobs.filter_existing(valid).await {
            Ok(jobs) => jobs,
            Err(e) => {
                return CompanyOutcome::Deferred {
                    error: format!("existence check failed: {}", e),
                };
            }
        };
        let duplicates = valid_count - new_jobs.len();
        let published = new_jobs.len();

        if new_jobs.is_empty() {
            debug!(company = %company.name, "No new jobs on {}", page_url);
        } else {
            info!(
                company = %company.name,
                "Found {} new jobs (filtered {} existing)", published, duplicates
            );
            if let Err(e) = self.batch_queue.publish_batch(new_jobs, page_url).await {
                error!(company = %company.name, "Failed to publish job batch: {}", e);
                return CompanyOutcome::Deferred { error: e.to_string() };
            }
        }

        CompanyOutcome::Scraped {
            published,
            invalid: invalid.len(),
            duplicates,
        }
    }

    /// Decode, process, and settle one delivery. Panics stay inside the item.
    async fn handle_delivery(&self, delivery: Delivery, cancel: &CancellationToken) {
        let result = match delivery.decode::<CompanyRecord>() {
            Ok(company) => {
                if delivery.is_redelivery() {
                    debug!(company = %company.name, "Redelivery #{}", delivery.handle.delivery_count);
                }
                let start = Instant::now();
                AssertUnwindSafe(self.process_company(&company, cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        error!(company = %company.name, "Worker panicked: {}", message);
                        ProcessResult::new(&company.page_url, CompanyOutcome::failed(message), start)
                    })
            }
            Err(e) => {
                warn!(
                    "Dropping undecodable company message {} ({}): {}",
                    delivery.handle.message_id,
                    truncate_str(&delivery.payload, 120),
                    e
                );
                ProcessResult::new("", CompanyOutcome::failed(e.to_string()), Instant::now())
            }
        };

        self.stats.record(&result.outcome);
        debug!("Processed {} in {:?}: {:?}", result.page_url, result.duration, result.outcome);

        let settled = match &result.outcome {
            outcome if outcome.should_ack() => self.company_queue.ack(&delivery.handle).await,
            CompanyOutcome::Cancelled => self.company_queue.nack(&delivery.handle, true).await,
            // Left unacked; the lease timeout redelivers it
            _ => Ok(()),
        };
        if let Err(e) = settled {
            warn!("Failed to settle company message {}: {}", delivery.handle.message_id, e);
        }
    }

    /// Drain the company queue until it stays idle or `shutdown` fires.
    ///
    /// Shutdown stops the feeder first, lets the workers drain the buffer for
    /// up to the grace period, then cancels them. Whatever is still buffered
    /// afterwards is nacked back onto the queue.
    pub async fn run(self: &Arc<Self>, shutdown: CancellationToken) -> Result<ScrapeStats, QueueError> {
        let consumer = self.company_queue.consume(self.config.prefetch).await?;
        let (tx, rx) = mpsc::channel(self.config.buffer_capacity);
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let worker_token = CancellationToken::new();

        info!(
            "Starting scrape coordinator (workers={}, buffer={}, prefetch={})",
            self.config.workers, self.config.buffer_capacity, self.config.prefetch
        );

        let feeder = tokio::spawn(Self::feed(
            consumer,
            tx,
            shutdown.clone(),
            self.config.idle_timeout,
            self.company_queue.clone(),
        ));

        let workers: Vec<JoinHandle<()>> = (0..self.config.workers)
            .map(|id| {
                let coordinator = Arc::clone(self);
                let rx = Arc::clone(&rx);
                let token = worker_token.clone();
                tokio::spawn(async move { coordinator.work(id, rx, token).await })
            })
            .collect();

        if let Err(e) = feeder.await {
            error!("Feeder task failed: {}", e);
        }

        // The feeder dropped its sender, so workers exit once the buffer is empty
        let mut joined = Box::pin(futures::future::join_all(workers));
        tokio::select! {
            _ = &mut joined => {}
            _ = shutdown.cancelled() => {
                if tokio::time::timeout(self.config.shutdown_grace, &mut joined).await.is_err() {
                    warn!(
                        "Workers still busy after {:?}; cancelling",
                        self.config.shutdown_grace
                    );
                    worker_token.cancel();
                    joined.await;
                }
            }
        }

        let mut leftover = rx.lock().await;
        while let Ok(delivery) = leftover.try_recv() {
            if let Err(e) = self.company_queue.nack(&delivery.handle, true).await {
                warn!("Failed to requeue company message {}: {}", delivery.handle.message_id, e);
            }
        }

        let stats = self.stats();
        info!(
            "Scrape coordinator stopped: {} processed, {} failed, {} requeued, {} jobs published, {} invalid, {} duplicates",
            stats.processed,
            stats.failed,
            stats.requeued,
            stats.jobs_published,
            stats.invalid_jobs,
            stats.duplicates
        );
        Ok(stats)
    }

    async fn feed(
        mut consumer: Box<dyn Consumer>,
        tx: mpsc::Sender<Delivery>,
        shutdown: CancellationToken,
        idle_timeout: std::time::Duration,
        queue: CompanyQueue,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Feeder cancelled");
                    break;
                }
                next = consumer.next(idle_timeout) => next,
            };

            let delivery = match next {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    info!("Company queue idle for {:?}; feeder done", idle_timeout);
                    break;
                }
                Err(e) => {
                    error!("Company consumer failed: {}", e);
                    break;
                }
            };

            let handle = delivery.handle.clone();
            let sent = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                sent = tx.send(delivery) => Some(sent),
            };
            match sent {
                Some(Ok(())) => {}
                // Workers are gone or shutdown fired while the buffer was full
                _ => {
                    if let Err(e) = queue.nack(&handle, true).await {
                        warn!("Failed to requeue company message {}: {}", handle.message_id, e);
                    }
                    break;
                }
            }
        }
    }

    async fn work(&self, id: usize, rx: SharedReceiver, cancel: CancellationToken) {
        debug!("Worker {} started", id);
        loop {
            let next = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    delivery = rx.recv() => delivery,
                }
            };
            let Some(delivery) = next else {
                break;
            };
            self.handle_delivery(delivery, &cancel).await;
        }
        debug!("Worker {} stopped", id);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use crate::queue::{JournalQueue, MessageQueue};
    use crate::scraping::fetcher::FetchError;
    use crate::scraping::retry::RetryPolicy;
    use crate::storage::{CompanyRegistry, JobRegistry};
    use crate::types::JobBatchMessage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    const PAGE: &str = r#"<script>COMPANY_POSITIONS_DATA = [
        {"name": "Backend Engineer", "url_comeet_hosted_page": "https://www.comeet.com/jobs/acme/1",
         "location": {"name": "Tel Aviv", "country": "IL"}},
        {"name": "Data Engineer", "url_comeet_hosted_page": "https://www.comeet.com/jobs/acme/2"}
    ];</script>"#;

    /// Serves fixed pages; unknown URLs get a 404
    struct StaticFetcher(HashMap<String, &'static str>);

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            if url.contains("panic") {
                panic!("fetcher exploded");
            }
            self.0.get(url).map(|s| s.to_string()).ok_or(FetchError::Status {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    /// Never answers until cancelled; signals once a fetch is underway
    #[derive(Default)]
    struct HangingFetcher {
        started: tokio::sync::Notify,
    }

    #[async_trait]
    impl PageFetcher for HangingFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(FetchError::Timeout(Duration::from_secs(60)))
        }
    }

    /// Job-batch broker that cannot persist anything
    struct RejectingBroker(JournalQueue);

    #[async_trait]
    impl MessageQueue for RejectingBroker {
        async fn declare(&self, topic: &str) -> Result<(), QueueError> {
            self.0.declare(topic).await
        }

        async fn publish(&self, _topic: &str, _payload: String) -> Result<u64, QueueError> {
            Err(QueueError::Io(std::io::Error::new(std::io::ErrorKind::Other, "journal unavailable")))
        }

        async fn consume(&self, topic: &str, prefetch: usize) -> Result<Box<dyn Consumer>, QueueError> {
            self.0.consume(topic, prefetch).await
        }

        async fn ack(&self, handle: &crate::queue::DeliveryHandle) -> Result<(), QueueError> {
            self.0.ack(handle).await
        }

        async fn nack(&self, handle: &crate::queue::DeliveryHandle, requeue: bool) -> Result<(), QueueError> {
            self.0.nack(handle, requeue).await
        }
    }

    struct Harness {
        coordinator: Arc<ScrapeCoordinator>,
        broker: JournalQueue,
        companies: Arc<CompanyRegistry>,
        jobs: Arc<JobRegistry>,
        company_queue: CompanyQueue,
        batch_queue: JobBatchQueue,
    }

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            workers: 2,
            buffer_capacity: 4,
            prefetch: 4,
            idle_timeout: Duration::from_millis(50),
            retry: RetryPolicy::new(3, DelayRange::none()),
            politeness_delay: DelayRange::none(),
            shutdown_grace: Duration::from_millis(200),
            region_marker: crate::config::DEFAULT_REGION_MARKER.to_string(),
        }
    }

    async fn harness_with(
        fetcher: Arc<dyn PageFetcher>,
        lease_timeout: Duration,
        batch_broker: Option<Arc<dyn MessageQueue>>,
    ) -> Harness {
        let broker = JournalQueue::in_memory(lease_timeout, Duration::from_millis(5));
        let shared: Arc<dyn MessageQueue> = Arc::new(broker.clone());
        let company_queue = CompanyQueue::connect_companies(shared.clone()).await.unwrap();
        let batch_queue = JobBatchQueue::connect_job_batches(batch_broker.unwrap_or(shared))
            .await
            .unwrap();
        let companies = Arc::new(CompanyRegistry::in_memory());
        let jobs = Arc::new(JobRegistry::in_memory());
        let coordinator = Arc::new(ScrapeCoordinator::new(
            test_config(),
            fetcher,
            jobs.clone(),
            companies.clone(),
            company_queue.clone(),
            batch_queue.clone(),
        ));
        Harness {
            coordinator,
            broker,
            companies,
            jobs,
            company_queue,
            batch_queue,
        }
    }

    async fn harness(pages: &[(&str, &'static str)]) -> Harness {
        let fetcher = StaticFetcher(pages.iter().map(|(u, p)| (u.to_string(), *p)).collect());
        harness_with(Arc::new(fetcher), Duration::from_secs(30), None).await
    }

    async fn enqueue(h: &Harness, name: &str, url: &str) {
        let company = CompanyRecord::new(name, "comeet.com", url);
        h.companies.insert_company(company.clone()).await.unwrap();
        h.company_queue.publish(&company).await.unwrap();
    }

    #[tokio::test]
    async fn test_scrapes_and_publishes_one_batch_per_company() {
        let url = "https://www.comeet.com/jobs/acme/AB.001";
        let h = harness(&[(url, PAGE)]).await;
        enqueue(&h, "Acme", url).await;

        let stats = h.coordinator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.jobs_published, 2);

        let mut consumer = h.batch_queue.consume(1).await.unwrap();
        let delivery = consumer.next(Duration::from_millis(50)).await.unwrap().unwrap();
        let batch: JobBatchMessage = delivery.decode().unwrap();
        assert_eq!(batch.source_url, url);
        let titles: Vec<_> = batch.jobs.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["Backend Engineer", "Data Engineer"]);
        assert_eq!(batch.jobs[0].company_name.as_deref(), Some("Acme"));

        assert!(h.companies.get(url).unwrap().last_scraped_at.is_some());
        let company_topic = h.broker.stats(crate::queue::COMPANY_TOPIC).unwrap();
        assert_eq!(company_topic.ready + company_topic.in_flight, 0);
    }

    #[tokio::test]
    async fn test_gone_page_is_acked_and_deactivated() {
        let h = harness(&[]).await;
        let url = "https://www.comeet.com/jobs/gone/XY.002";
        enqueue(&h, "Gone", url).await;

        let stats = h.coordinator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.deactivated, 1);
        assert!(!h.companies.get(url).unwrap().active);
        let company_topic = h.broker.stats(crate::queue::COMPANY_TOPIC).unwrap();
        assert_eq!(company_topic.ready + company_topic.in_flight, 0);
    }

    #[tokio::test]
    async fn test_panic_is_contained_to_one_item() {
        let ok = "https://www.comeet.com/jobs/acme/AB.001";
        let h = harness(&[(ok, PAGE)]).await;
        enqueue(&h, "Boom", "https://www.comeet.com/jobs/panic/ZZ.000").await;
        enqueue(&h, "Acme", ok).await;

        let stats = h.coordinator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn test_undecodable_message_counts_as_failed() {
        let h = harness(&[]).await;
        h.company_queue
            .broker()
            .publish(crate::queue::COMPANY_TOPIC, "not json".to_string())
            .await
            .unwrap();

        let stats = h.coordinator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_already_stored_jobs_are_not_republished() {
        let url = "https://www.comeet.com/jobs/acme/AB.001";
        let h = harness(&[(url, PAGE)]).await;
        enqueue(&h, "Acme", url).await;
        h.coordinator.run(CancellationToken::new()).await.unwrap();

        // Persist the first batch, then scrape the same page again
        let mut consumer = h.batch_queue.consume(1).await.unwrap();
        let delivery = consumer.next(Duration::from_millis(50)).await.unwrap().unwrap();
        let batch: JobBatchMessage = delivery.decode().unwrap();
        for job in &batch.jobs {
            h.jobs.insert_job(job).await.unwrap();
        }
        h.batch_queue.ack(&delivery.handle).await.unwrap();

        h.company_queue
            .publish(&CompanyRecord::new("Acme", "comeet.com", url))
            .await
            .unwrap();
        let stats = h.coordinator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.jobs_published, 2);
        assert_eq!(stats.duplicates, 2);
        let batches = h.broker.stats(crate::queue::JOB_BATCH_TOPIC).unwrap();
        assert_eq!(batches.ready, 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_leaves_message_queued() {
        let url = "https://www.comeet.com/jobs/acme/AB.001";
        let h = harness(&[(url, PAGE)]).await;
        enqueue(&h, "Acme", url).await;

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let stats = h.coordinator.run(shutdown).await.unwrap();
        assert_eq!(stats.processed + stats.failed, 0);

        // The message is still on the queue for the next run
        let company_topic = h.broker.stats(crate::queue::COMPANY_TOPIC).unwrap();
        assert_eq!(company_topic.ready + company_topic.in_flight, 1);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_failed_publish_defers_and_redelivers() {
        let url = "https://www.comeet.com/jobs/acme/AB.001";
        let fetcher = StaticFetcher([(url.to_string(), PAGE)].into_iter().collect());
        let rejecting: Arc<dyn MessageQueue> = Arc::new(RejectingBroker(JournalQueue::in_memory(
            Duration::from_secs(30),
            Duration::from_millis(5),
        )));
        let h = harness_with(Arc::new(fetcher), Duration::from_millis(300), Some(rejecting)).await;
        enqueue(&h, "Acme", url).await;

        let stats = h.coordinator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.processed + stats.failed, 0);
        // Not acked, and not recorded as scraped
        let company_topic = h.broker.stats(crate::queue::COMPANY_TOPIC).unwrap();
        assert_eq!(company_topic.in_flight, 1);
        assert!(h.companies.get(url).unwrap().last_scraped_at.is_none());

        tokio::time::sleep(Duration::from_millis(350)).await;
        let mut consumer = h.company_queue.consume(1).await.unwrap();
        let again = consumer.next(Duration::from_millis(100)).await.unwrap().unwrap();
        let company: CompanyRecord = again.decode().unwrap();
        assert_eq!(company.page_url, url);
        assert_eq!(again.handle.delivery_count, 2);
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_requeues_message() {
        let fetcher = Arc::new(HangingFetcher::default());
        let h = harness_with(fetcher.clone(), Duration::from_secs(30), None).await;
        let url = "https://www.comeet.com/jobs/slow/SL.001";
        enqueue(&h, "Slow", url).await;

        let shutdown = CancellationToken::new();
        let coordinator = Arc::clone(&h.coordinator);
        let run = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { coordinator.run(shutdown).await }
        });

        fetcher.started.notified().await;
        shutdown.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("coordinator stops after the grace period")
            .unwrap()
            .unwrap();

        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.processed + stats.failed, 0);
        let company_topic = h.broker.stats(crate::queue::COMPANY_TOPIC).unwrap();
        assert_eq!(company_topic.ready, 1);
        assert_eq!(company_topic.in_flight, 0);
        assert!(h.companies.get(url).unwrap().last_scraped_at.is_none());
    }
}
