use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::entry::{JobEntry, JobOpts, JobStatus, QueueName};
use crate::error::QueueError;
use crate::schedule::Schedule;

/// A registered recurrence that produces a fresh job each time it is due.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringTrigger {
    /// Stable identity, e.g. `"document-ingest:poll"`.
    pub key: String,
    pub queue: QueueName,
    pub payload: serde_json::Value,
    pub schedule: Schedule,
    pub opts: JobOpts,
    pub next_run_at: DateTime<Utc>,
}

impl RecurringTrigger {
    /// Build the job this trigger produces when fired at `now`.
    pub fn materialize(&self, now: DateTime<Utc>) -> JobEntry {
        JobEntry::new(self.queue, self.payload.clone(), &self.opts, now).from_recurring(&self.key)
    }
}

/// Per-queue job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub(crate) fn bump(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}

/// Durable storage behind the queue runtime.
///
/// The runtime owns every state transition; a store only persists entries and
/// provides the atomic claim. Each method is a single storage operation.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    async fn insert(&self, entry: &JobEntry) -> Result<(), QueueError>;

    /// Atomically claim the next eligible job on `queue`.
    ///
    /// Eligible means pending with `run_at <= now`, or running with a lock
    /// older than `lock_ttl` (its worker is presumed dead). Earliest `run_at`
    /// wins. The claimed entry comes back with status running, the lock set
    /// and `attempts` incremented.
    async fn claim_next(
        &self,
        queue: QueueName,
        worker_id: &str,
        now: DateTime<Utc>,
        lock_ttl: Duration,
    ) -> Result<Option<JobEntry>, QueueError>;

    /// Write back an entry by id.
    async fn update(&self, entry: &JobEntry) -> Result<(), QueueError>;

    async fn get(&self, id: Uuid) -> Result<Option<JobEntry>, QueueError>;

    /// Most recent entries on `queue` in `status`, newest first.
    async fn list(
        &self,
        queue: QueueName,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<JobEntry>, QueueError>;

    async fn counts(&self, queue: QueueName) -> Result<QueueCounts, QueueError>;

    /// Register or replace a recurring trigger. When the schedule is
    /// unchanged the stored `next_run_at` is kept so a restart does not skip
    /// or repeat a slot.
    async fn upsert_recurring(&self, trigger: &RecurringTrigger) -> Result<(), QueueError>;

    async fn due_recurring(&self, now: DateTime<Utc>) -> Result<Vec<RecurringTrigger>, QueueError>;

    /// Advance a trigger from `expected_next` to `next` and insert `entry`,
    /// atomically. Returns false when another process already advanced it.
    async fn fire_recurring(
        &self,
        key: &str,
        expected_next: DateTime<Utc>,
        next: DateTime<Utc>,
        entry: &JobEntry,
    ) -> Result<bool, QueueError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), QueueError>;
}
