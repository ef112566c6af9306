//! Pending embedding batch ledger
//!
//! Rows are never deleted; completed and failed batches stay as an audit trail.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AppendLog, PendingBatchStore, StoreError};
use crate::types::{BatchStatus, PendingBatch};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LedgerEvent {
    Created { batch: PendingBatch },
    Transitioned { batch_id: String, status: BatchStatus },
}

fn apply(batches: &mut HashMap<String, PendingBatch>, event: LedgerEvent) {
    match event {
        LedgerEvent::Created { batch } => {
            batches.entry(batch.batch_id.clone()).or_insert(batch);
        }
        LedgerEvent::Transitioned { batch_id, status } => {
            if let Some(b) = batches.get_mut(&batch_id) {
                b.status = status;
            }
        }
    }
}

struct Inner {
    batches: HashMap<String, PendingBatch>,
    log: Option<AppendLog<LedgerEvent>>,
}

impl Inner {
    fn commit(&mut self, event: LedgerEvent) -> Result<(), StoreError> {
        if let Some(log) = self.log.as_mut() {
            log.append_or_reopen(&event)?;
        }
        apply(&mut self.batches, event);
        Ok(())
    }
}

pub struct PendingBatchLedger {
    inner: RwLock<Inner>,
}

impl PendingBatchLedger {
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                batches: HashMap::new(),
                log: None,
            }),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let (log, events) = AppendLog::open(path)?;
        let mut batches = HashMap::new();
        for event in events {
            apply(&mut batches, event);
        }
        info!("Loaded pending batch ledger with {} batches", batches.len());
        Ok(Self {
            inner: RwLock::new(Inner {
                batches,
                log: Some(log),
            }),
        })
    }

    /// Every batch ever recorded, oldest first
    pub fn all(&self) -> Vec<PendingBatch> {
        let mut all: Vec<_> = self.inner.read().batches.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.batch_id.cmp(&b.batch_id)));
        all
    }
}

#[async_trait]
impl PendingBatchStore for PendingBatchLedger {
    async fn insert_pending(&self, batch_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        if inner.batches.contains_key(batch_id) {
            return Ok(false);
        }
        inner.commit(LedgerEvent::Created {
            batch: PendingBatch {
                batch_id: batch_id.to_string(),
                status: BatchStatus::Processing,
                created_at: Utc::now(),
            },
        })?;
        Ok(true)
    }

    async fn processing(&self) -> Result<Vec<PendingBatch>, StoreError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|b| b.status == BatchStatus::Processing)
            .collect())
    }

    async fn get(&self, batch_id: &str) -> Result<Option<PendingBatch>, StoreError> {
        Ok(self.inner.read().batches.get(batch_id).cloned())
    }

    async fn transition(&self, batch_id: &str, to: BatchStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let from = inner
            .batches
            .get(batch_id)
            .map(|b| b.status)
            .ok_or_else(|| StoreError::NotFound(batch_id.to_string()))?;
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                batch_id: batch_id.to_string(),
                from,
                to,
            });
        }
        inner.commit(LedgerEvent::Transitioned {
            batch_id: batch_id.to_string(),
            status: to,
        })
    }
}
