//! Journal-backed lease broker

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Consumer, Delivery, DeliveryHandle, MessageQueue, QueueError};
use crate::storage::AppendLog;

/// Compact the journal after this many settled messages
const COMPACT_EVERY: usize = 1024;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Declare { topic: String },
    Publish { topic: String, id: u64, payload: String },
    Ack { topic: String, id: u64 },
    Drop { topic: String, id: u64 },
}

struct Lease {
    token: u64,
    expires_at: Instant,
    /// Prefetch slot of the consumer holding the lease; released with it
    _permit: Option<OwnedSemaphorePermit>,
}

#[derive(Default)]
struct TopicState {
    ready: VecDeque<u64>,
    in_flight: HashMap<u64, Lease>,
}

struct StoredMessage {
    topic: String,
    payload: String,
    deliveries: u32,
}

/// Ready/in-flight counts for one topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicStats {
    pub ready: usize,
    pub in_flight: usize,
}

struct State {
    topics: HashMap<String, TopicState>,
    messages: HashMap<u64, StoredMessage>,
    next_id: u64,
    next_lease: u64,
    journal: Option<AppendLog<JournalEntry>>,
    settled_since_compact: usize,
}

impl State {
    fn empty(journal: Option<AppendLog<JournalEntry>>) -> Self {
        Self {
            topics: HashMap::new(),
            messages: HashMap::new(),
            next_id: 0,
            next_lease: 0,
            journal,
            settled_since_compact: 0,
        }
    }

    /// Append an entry. On failure the journal is reopened, every topic is
    /// re-declared and the write is tried once more.
    fn persist(&mut self, entry: &JournalEntry) -> Result<(), QueueError> {
        let State { topics, journal, .. } = self;
        let Some(journal) = journal.as_mut() else {
            return Ok(());
        };
        if let Err(e) = journal.append(entry) {
            warn!("Queue journal write failed ({}), reconnecting", e);
            journal.reopen()?;
            for topic in topics.keys() {
                journal.append(&JournalEntry::Declare {
                    topic: topic.clone(),
                })?;
            }
            journal.append(entry)?;
            info!("Queue journal reconnected, {} topics re-declared", topics.len());
        }
        Ok(())
    }

    /// Entries that reproduce the current state
    fn snapshot(&self) -> Vec<JournalEntry> {
        let mut names: Vec<&String> = self.topics.keys().collect();
        names.sort();
        let mut entries: Vec<JournalEntry> = names
            .into_iter()
            .map(|topic| JournalEntry::Declare {
                topic: topic.clone(),
            })
            .collect();

        let mut ids: Vec<u64> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(msg) = self.messages.get(&id) {
                entries.push(JournalEntry::Publish {
                    topic: msg.topic.clone(),
                    id,
                    payload: msg.payload.clone(),
                });
            }
        }
        entries
    }

    fn compact(&mut self) -> Result<(), QueueError> {
        let entries = self.snapshot();
        if let Some(journal) = self.journal.as_mut() {
            journal.rewrite(&entries)?;
            debug!("Compacted queue journal to {} entries", entries.len());
        }
        self.settled_since_compact = 0;
        Ok(())
    }

    fn note_settled(&mut self) {
        self.settled_since_compact += 1;
        if self.settled_since_compact >= COMPACT_EVERY {
            if let Err(e) = self.compact() {
                warn!("Queue journal compaction failed: {}", e);
            }
        }
    }

    /// Check that `handle` still holds the lease on its message
    fn verify_lease(&self, handle: &DeliveryHandle) -> Result<(), QueueError> {
        let topic = self
            .topics
            .get(&handle.topic)
            .ok_or_else(|| QueueError::UnknownTopic(handle.topic.clone()))?;
        match topic.in_flight.get(&handle.message_id) {
            Some(lease) if lease.token == handle.lease => Ok(()),
            _ => Err(QueueError::LeaseExpired {
                topic: handle.topic.clone(),
                message_id: handle.message_id,
            }),
        }
    }

    fn remove(&mut self, handle: &DeliveryHandle) {
        if let Some(topic) = self.topics.get_mut(&handle.topic) {
            topic.in_flight.remove(&handle.message_id);
        }
        self.messages.remove(&handle.message_id);
    }

    /// Move expired leases on `topic` back to the front of the ready queue.
    ///
    /// Dropping a lease hands its prefetch permit back to the consumer.
    fn reclaim_expired(&mut self, topic: &str, now: Instant) -> Result<usize, QueueError> {
        let state = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| QueueError::UnknownTopic(topic.to_string()))?;

        let mut expired: Vec<u64> = state
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        expired.sort_unstable();
        for id in expired.iter().rev() {
            state.in_flight.remove(id);
            state.ready.push_front(*id);
        }
        debug!("Lease expired on {} message(s) in '{}'", expired.len(), topic);
        Ok(expired.len())
    }

    /// Lease the next ready message, reclaiming expired leases first.
    ///
    /// The permit moves into the lease only when a message is taken.
    fn take(
        &mut self,
        topic: &str,
        lease_timeout: Duration,
        permit: &mut Option<OwnedSemaphorePermit>,
    ) -> Result<Option<(String, DeliveryHandle)>, QueueError> {
        let now = Instant::now();
        self.reclaim_expired(topic, now)?;

        let State {
            topics,
            messages,
            next_lease,
            ..
        } = self;
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| QueueError::UnknownTopic(topic.to_string()))?;

        while let Some(id) = state.ready.pop_front() {
            let Some(msg) = messages.get_mut(&id) else {
                continue;
            };
            msg.deliveries += 1;
            let token = *next_lease;
            *next_lease += 1;
            state.in_flight.insert(
                id,
                Lease {
                    token,
                    expires_at: now + lease_timeout,
                    _permit: permit.take(),
                },
            );
            let handle = DeliveryHandle {
                topic: topic.to_string(),
                message_id: id,
                delivery_count: msg.deliveries,
                lease: token,
            };
            return Ok(Some((msg.payload.clone(), handle)));
        }
        Ok(None)
    }
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    lease_timeout: Duration,
    poll_interval: Duration,
}

/// Broker that journals every publish and settlement to a JSON-lines file.
///
/// Cloning is cheap and every clone shares the same broker.
#[derive(Clone)]
pub struct JournalQueue {
    shared: Arc<Shared>,
}

impl JournalQueue {
    /// Volatile broker for tests and dry runs
    pub fn in_memory(lease_timeout: Duration, poll_interval: Duration) -> Self {
        Self::with_state(State::empty(None), lease_timeout, poll_interval)
    }

    /// Open the journal at `path`, replay it and compact it
    pub fn open(
        path: impl AsRef<Path>,
        lease_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, QueueError> {
        let (journal, entries) = AppendLog::open(path)?;
        let mut state = State::empty(Some(journal));

        let mut published: Vec<(u64, String, String)> = Vec::new();
        let mut settled: HashSet<u64> = HashSet::new();
        for entry in entries {
            match entry {
                JournalEntry::Declare { topic } => {
                    state.topics.entry(topic).or_default();
                }
                JournalEntry::Publish { topic, id, payload } => {
                    state.topics.entry(topic.clone()).or_default();
                    state.next_id = state.next_id.max(id + 1);
                    published.push((id, topic, payload));
                }
                JournalEntry::Ack { id, .. } | JournalEntry::Drop { id, .. } => {
                    settled.insert(id);
                }
            }
        }
        for (id, topic, payload) in published {
            if settled.contains(&id) {
                continue;
            }
            if let Some(t) = state.topics.get_mut(&topic) {
                t.ready.push_back(id);
            }
            state.messages.insert(
                id,
                StoredMessage {
                    topic,
                    payload,
                    deliveries: 0,
                },
            );
        }
        state.compact()?;
        info!(
            "Opened queue journal: {} topics, {} pending messages",
            state.topics.len(),
            state.messages.len()
        );

        Ok(Self::with_state(state, lease_timeout, poll_interval))
    }

    fn with_state(state: State, lease_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                notify: Notify::new(),
                lease_timeout,
                poll_interval,
            }),
        }
    }

    pub fn stats(&self, topic: &str) -> Option<TopicStats> {
        let state = self.shared.state.lock();
        state.topics.get(topic).map(|t| TopicStats {
            ready: t.ready.len(),
            in_flight: t.in_flight.len(),
        })
    }

    /// Rewrite the journal so it holds only unsettled messages
    pub fn compact(&self) -> Result<(), QueueError> {
        self.shared.state.lock().compact()
    }
}

#[async_trait]
impl MessageQueue for JournalQueue {
    async fn declare(&self, topic: &str) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        if state.topics.contains_key(topic) {
            return Ok(());
        }
        state.persist(&JournalEntry::Declare {
            topic: topic.to_string(),
        })?;
        state.topics.insert(topic.to_string(), TopicState::default());
        debug!("Declared topic '{}'", topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<u64, QueueError> {
        let id = {
            let mut state = self.shared.state.lock();
            if !state.topics.contains_key(topic) {
                return Err(QueueError::UnknownTopic(topic.to_string()));
            }
            let id = state.next_id;
            state.persist(&JournalEntry::Publish {
                topic: topic.to_string(),
                id,
                payload: payload.clone(),
            })?;
            state.next_id += 1;
            state.messages.insert(
                id,
                StoredMessage {
                    topic: topic.to_string(),
                    payload,
                    deliveries: 0,
                },
            );
            if let Some(t) = state.topics.get_mut(topic) {
                t.ready.push_back(id);
            }
            id
        };
        self.shared.notify.notify_waiters();
        Ok(id)
    }

    async fn consume(&self, topic: &str, prefetch: usize) -> Result<Box<dyn Consumer>, QueueError> {
        if !self.shared.state.lock().topics.contains_key(topic) {
            return Err(QueueError::UnknownTopic(topic.to_string()));
        }
        Ok(Box::new(JournalConsumer {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            permits: Arc::new(Semaphore::new(prefetch.max(1))),
        }))
    }

    async fn ack(&self, handle: &DeliveryHandle) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        state.verify_lease(handle)?;
        state.persist(&JournalEntry::Ack {
            topic: handle.topic.clone(),
            id: handle.message_id,
        })?;
        state.remove(handle);
        state.note_settled();
        Ok(())
    }

    async fn nack(&self, handle: &DeliveryHandle, requeue: bool) -> Result<(), QueueError> {
        {
            let mut state = self.shared.state.lock();
            state.verify_lease(handle)?;
            if requeue {
                if let Some(t) = state.topics.get_mut(&handle.topic) {
                    t.in_flight.remove(&handle.message_id);
                    t.ready.push_front(handle.message_id);
                }
            } else {
                state.persist(&JournalEntry::Drop {
                    topic: handle.topic.clone(),
                    id: handle.message_id,
                })?;
                state.remove(handle);
                state.note_settled();
                warn!(
                    "Dropped message {} from '{}' after {} deliveries",
                    handle.message_id, handle.topic, handle.delivery_count
                );
            }
        }
        if requeue {
            self.shared.notify.notify_waiters();
        }
        Ok(())
    }
}

struct JournalConsumer {
    shared: Arc<Shared>,
    topic: String,
    permits: Arc<Semaphore>,
}

impl JournalConsumer {
    /// Wait for a prefetch slot. Leases abandoned without ack or nack only
    /// give their slot back once they expire, so expiry is checked while
    /// waiting.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, QueueError> {
        loop {
            match self.permits.clone().try_acquire_owned() {
                Ok(permit) => return Ok(permit),
                Err(TryAcquireError::Closed) => return Err(QueueError::Closed),
                Err(TryAcquireError::NoPermits) => {}
            }

            let reclaimed = self
                .shared
                .state
                .lock()
                .reclaim_expired(&self.topic, Instant::now())?;
            if reclaimed > 0 {
                self.shared.notify.notify_waiters();
                continue;
            }

            match tokio::time::timeout(self.shared.poll_interval, self.permits.clone().acquire_owned()).await {
                Ok(Ok(permit)) => return Ok(permit),
                Ok(Err(_)) => return Err(QueueError::Closed),
                Err(_) => {}
            }
        }
    }
}

#[async_trait]
impl Consumer for JournalConsumer {
    async fn next(&mut self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let mut permit = Some(self.acquire_permit().await?);
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = self
                .shared
                .state
                .lock()
                .take(&self.topic, self.shared.lease_timeout, &mut permit)?;
            if let Some((payload, handle)) = taken {
                return Ok(Some(Delivery::new(payload, handle)));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = (deadline - now).min(self.shared.poll_interval);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }
}
