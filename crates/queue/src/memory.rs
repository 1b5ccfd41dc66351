use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::entry::{JobEntry, JobStatus, QueueName};
use crate::error::QueueError;
use crate::store::{QueueCounts, QueueStore, RecurringTrigger};

#[derive(Default)]
struct Inner {
    entries: Vec<JobEntry>,
    recurring: HashMap<String, RecurringTrigger>,
}

/// In-memory [`QueueStore`] for development and tests.
///
/// Not durable: everything is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryQueueStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, in insertion order.
    pub fn entries(&self) -> Vec<JobEntry> {
        self.inner.lock().entries.clone()
    }

    pub fn recurring(&self, key: &str) -> Option<RecurringTrigger> {
        self.inner.lock().recurring.get(key).cloned()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, entry: &JobEntry) -> Result<(), QueueError> {
        self.inner.lock().entries.push(entry.clone());
        Ok(())
    }

    async fn claim_next(
        &self,
        queue: QueueName,
        worker_id: &str,
        now: DateTime<Utc>,
        lock_ttl: Duration,
    ) -> Result<Option<JobEntry>, QueueError> {
        let mut inner = self.inner.lock();

        let pos = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.queue == queue && e.is_claimable(now, lock_ttl))
            .min_by_key(|(_, e)| e.run_at)
            .map(|(i, _)| i);

        Ok(pos.map(|idx| {
            let entry = &mut inner.entries[idx];
            entry.mark_claimed(worker_id, now);
            entry.clone()
        }))
    }

    async fn update(&self, entry: &JobEntry) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry.clone();
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobEntry>, QueueError> {
        Ok(self.inner.lock().entries.iter().find(|e| e.id == id).cloned())
    }

    async fn list(
        &self,
        queue: QueueName,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<JobEntry>, QueueError> {
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .iter()
            .rev()
            .filter(|e| e.queue == queue && e.status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn counts(&self, queue: QueueName) -> Result<QueueCounts, QueueError> {
        let inner = self.inner.lock();
        let mut counts = QueueCounts::default();
        for e in inner.entries.iter().filter(|e| e.queue == queue) {
            counts.bump(e.status);
        }
        Ok(counts)
    }

    async fn upsert_recurring(&self, trigger: &RecurringTrigger) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let mut trigger = trigger.clone();
        if let Some(existing) = inner.recurring.get(&trigger.key) {
            if existing.schedule == trigger.schedule {
                trigger.next_run_at = existing.next_run_at;
            }
        }
        inner.recurring.insert(trigger.key.clone(), trigger);
        Ok(())
    }

    async fn due_recurring(&self, now: DateTime<Utc>) -> Result<Vec<RecurringTrigger>, QueueError> {
        let inner = self.inner.lock();
        let mut due: Vec<_> = inner
            .recurring
            .values()
            .filter(|t| t.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_run_at);
        Ok(due)
    }

    async fn fire_recurring(
        &self,
        key: &str,
        expected_next: DateTime<Utc>,
        next: DateTime<Utc>,
        entry: &JobEntry,
    ) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock();
        match inner.recurring.get_mut(key) {
            Some(trigger) if trigger.next_run_at == expected_next => {
                trigger.next_run_at = next;
            }
            _ => return Ok(false),
        }
        inner.entries.push(entry.clone());
        Ok(true)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
