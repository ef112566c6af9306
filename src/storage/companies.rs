//! File-backed company registry

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AppendLog, CompanyStore, StoreError};
use crate::types::CompanyRecord;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum CompanyEvent {
    Inserted { company: CompanyRecord },
    Scraped { page_url: String, at: DateTime<Utc> },
    Deactivated { page_url: String },
}

fn apply(companies: &mut HashMap<String, CompanyRecord>, event: CompanyEvent) {
    match event {
        CompanyEvent::Inserted { company } => {
            companies.entry(company.page_url.clone()).or_insert(company);
        }
        CompanyEvent::Scraped { page_url, at } => {
            if let Some(c) = companies.get_mut(&page_url) {
                c.last_scraped_at = Some(at);
            }
        }
        CompanyEvent::Deactivated { page_url } => {
            if let Some(c) = companies.get_mut(&page_url) {
                c.active = false;
            }
        }
    }
}

struct Inner {
    companies: HashMap<String, CompanyRecord>,
    log: Option<AppendLog<CompanyEvent>>,
}

impl Inner {
    fn commit(&mut self, event: CompanyEvent) -> Result<(), StoreError> {
        if let Some(log) = self.log.as_mut() {
            log.append_or_reopen(&event)?;
        }
        apply(&mut self.companies, event);
        Ok(())
    }
}

/// Company store keyed by careers page URL
pub struct CompanyRegistry {
    inner: RwLock<Inner>,
}

impl CompanyRegistry {
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                companies: HashMap::new(),
                log: None,
            }),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let (log, events) = AppendLog::open(path)?;
        let mut companies = HashMap::new();
        for event in events {
            apply(&mut companies, event);
        }
        info!("Loaded company registry with {} companies", companies.len());
        Ok(Self {
            inner: RwLock::new(Inner {
                companies,
                log: Some(log),
            }),
        })
    }

    pub fn get(&self, page_url: &str) -> Option<CompanyRecord> {
        self.inner.read().companies.get(page_url).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CompanyStore for CompanyRegistry {
    async fn insert_company(&self, company: CompanyRecord) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        if inner.companies.contains_key(&company.page_url) {
            return Ok(false);
        }
        inner.commit(CompanyEvent::Inserted { company })?;
        Ok(true)
    }

    async fn stale_companies(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<CompanyRecord>, StoreError> {
        let mut stale: Vec<CompanyRecord> = self
            .inner
            .read()
            .companies
            .values()
            .filter(|c| c.active && c.is_stale(now, max_age))
            .cloned()
            .collect();
        // None sorts before Some, so never-scraped companies come first
        stale.sort_by(|a, b| {
            a.last_scraped_at
                .cmp(&b.last_scraped_at)
                .then_with(|| a.discovered_at.cmp(&b.discovered_at))
                .then_with(|| a.page_url.cmp(&b.page_url))
        });
        Ok(stale)
    }

    async fn mark_scraped(&self, page_url: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        if !inner.companies.contains_key(page_url) {
            return Ok(false);
        }
        inner.commit(CompanyEvent::Scraped {
            page_url: page_url.to_string(),
            at,
        })?;
        Ok(true)
    }

    async fn mark_inactive(&self, page_url: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        match inner.companies.get(page_url) {
            Some(c) if c.active => {}
            _ => return Ok(false),
        }
        inner.commit(CompanyEvent::Deactivated {
            page_url: page_url.to_string(),
        })?;
        Ok(true)
    }
}
