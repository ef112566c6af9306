//! File-backed job registry

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AppendLog, JobStore, StoreError};
use crate::types::{Embedding, JobRecord};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JobEvent {
    Inserted { id: u64, job: JobRecord },
    Embedded { url_hash: String, embedding: Embedding },
}

#[derive(Default)]
struct JobTable {
    rows: BTreeMap<u64, JobRecord>,
    by_url: HashMap<String, u64>,
    by_hash: HashMap<String, u64>,
    next_id: u64,
}

impl JobTable {
    fn contains(&self, job: &JobRecord) -> bool {
        self.by_url.contains_key(&job.url) || self.by_hash.contains_key(&job.url_hash)
    }

    fn insert(&mut self, id: u64, job: JobRecord) {
        self.by_url.insert(job.url.clone(), id);
        self.by_hash.insert(job.url_hash.clone(), id);
        self.rows.insert(id, job);
        self.next_id = self.next_id.max(id + 1);
    }

    fn set_embedding(&mut self, url_hash: &str, embedding: &[f32]) -> bool {
        let Some(id) = self.by_hash.get(url_hash) else {
            return false;
        };
        match self.rows.get_mut(id) {
            Some(job) if job.embedding.is_none() => {
                job.embedding = Some(embedding.to_vec());
                true
            }
            _ => false,
        }
    }

    fn apply(&mut self, event: JobEvent) {
        match event {
            JobEvent::Inserted { id, job } => self.insert(id, job),
            JobEvent::Embedded { url_hash, embedding } => {
                self.set_embedding(&url_hash, &embedding);
            }
        }
    }
}

struct Inner {
    table: JobTable,
    log: Option<AppendLog<JobEvent>>,
}

impl Inner {
    fn record(&mut self, event: &JobEvent) -> Result<(), StoreError> {
        if let Some(log) = self.log.as_mut() {
            log.append_or_reopen(event)?;
        }
        Ok(())
    }
}

/// Job store with unique URL and URL-hash keys
pub struct JobRegistry {
    inner: RwLock<Inner>,
}

impl JobRegistry {
    /// Volatile registry, nothing touches disk
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                table: JobTable::default(),
                log: None,
            }),
        }
    }

    /// Open (or create) a registry journaled at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let (log, events) = AppendLog::open(path)?;
        let mut table = JobTable::default();
        for event in events {
            table.apply(event);
        }
        info!("Loaded job registry with {} jobs", table.rows.len());
        Ok(Self {
            inner: RwLock::new(Inner {
                table,
                log: Some(log),
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.read().table.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_by_url(&self, url: &str) -> Option<JobRecord> {
        let inner = self.inner.read();
        let id = inner.table.by_url.get(url)?;
        inner.table.rows.get(id).cloned()
    }

    pub fn get_by_hash(&self, url_hash: &str) -> Option<JobRecord> {
        let inner = self.inner.read();
        let id = inner.table.by_hash.get(url_hash)?;
        inner.table.rows.get(id).cloned()
    }

    /// Number of jobs that already carry an embedding
    pub fn embedded_count(&self) -> usize {
        self.inner
            .read()
            .table
            .rows
            .values()
            .filter(|j| j.embedding.is_some())
            .count()
    }
}

#[async_trait]
impl JobStore for JobRegistry {
    async fn insert_job(&self, job: &JobRecord) -> Result<Option<u64>, StoreError> {
        let mut inner = self.inner.write();
        if inner.table.contains(job) {
            return Ok(None);
        }
        let id = inner.table.next_id;
        let event = JobEvent::Inserted {
            id,
            job: job.clone(),
        };
        inner.record(&event)?;
        inner.table.insert(id, job.clone());
        Ok(Some(id))
    }

    async fn jobs_without_embedding(&self, limit: usize) -> Result<Vec<JobRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .table
            .rows
            .values()
            .filter(|j| j.embedding.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_embedding(&self, url_hash: &str, embedding: &[f32]) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let writable = inner
            .table
            .by_hash
            .get(url_hash)
            .and_then(|id| inner.table.rows.get(id))
            .is_some_and(|job| job.embedding.is_none());
        if !writable {
            return Ok(false);
        }
        inner.record(&JobEvent::Embedded {
            url_hash: url_hash.to_string(),
            embedding: embedding.to_vec(),
        })?;
        Ok(inner.table.set_embedding(url_hash, embedding))
    }

    async fn filter_existing(&self, jobs: Vec<JobRecord>) -> Result<Vec<JobRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(jobs
            .into_iter()
            .filter(|job| !inner.table.contains(job))
            .collect())
    }
}
