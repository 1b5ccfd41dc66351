use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::backoff::BackoffPolicy;
use crate::outcome::JobFailure;

/// The queues the lead router runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    DocumentIngest,
    LeadDistribution,
    PaymentReconcile,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [
        QueueName::DocumentIngest,
        QueueName::LeadDistribution,
        QueueName::PaymentReconcile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentIngest => "document-ingest",
            Self::LeadDistribution => "lead-distribution",
            Self::PaymentReconcile => "payment-reconcile",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = crate::QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document-ingest" => Ok(Self::DocumentIngest),
            "lead-distribution" => Ok(Self::LeadDistribution),
            "payment-reconcile" => Ok(Self::PaymentReconcile),
            other => Err(crate::QueueError::UnknownQueue(other.to_string())),
        }
    }
}

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Options controlling retry and scheduling for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOpts {
    /// Maximum number of attempts (including the first).
    pub attempts: u32,
    pub backoff: BackoffPolicy,
    /// Delay before the job becomes eligible for processing.
    pub delay: Option<Duration>,
}

impl Default for JobOpts {
    /// Three attempts, exponential backoff from 5s.
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffPolicy::default(),
            delay: None,
        }
    }
}

impl JobOpts {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Returned from enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: Uuid,
    pub queue: QueueName,
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Back to pending, eligible again after `delay`.
    Retry { delay: Duration },
    /// Retries exhausted.
    Exhausted,
    /// Handler reported a failure that retrying cannot fix.
    Terminal,
}

/// Serialized representation of a queued job.
///
/// Fields map directly to columns of the `jobs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub id: Uuid,
    pub queue: QueueName,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
    /// Key of the recurring trigger that produced this job, if any
    pub recurring_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobEntry {
    pub fn new(
        queue: QueueName,
        payload: serde_json::Value,
        opts: &JobOpts,
        now: DateTime<Utc>,
    ) -> Self {
        let run_at = opts
            .delay
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now + d)
            .unwrap_or(now);

        Self {
            id: Uuid::new_v4(),
            queue,
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: opts.attempts.max(1),
            backoff: opts.backoff,
            run_at,
            locked_at: None,
            locked_by: None,
            last_error: None,
            result: None,
            recurring_key: None,
            created_at: now,
            finished_at: None,
        }
    }

    pub fn from_recurring(mut self, key: impl Into<String>) -> Self {
        self.recurring_key = Some(key.into());
        self
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            queue: self.queue,
        }
    }

    /// Whether a claim at `now` may pick this entry up.
    pub fn is_claimable(&self, now: DateTime<Utc>, lock_ttl: Duration) -> bool {
        match self.status {
            JobStatus::Pending => self.run_at <= now,
            JobStatus::Running => {
                let ttl = chrono::Duration::from_std(lock_ttl).unwrap_or(chrono::Duration::MAX);
                self.locked_at.map(|at| at + ttl < now).unwrap_or(true)
            }
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }

    /// Mark the entry claimed by `worker_id`.
    pub fn mark_claimed(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.locked_at = Some(now);
        self.locked_by = Some(worker_id.to_string());
        self.attempts += 1;
    }

    pub fn mark_completed(&mut self, result: Option<serde_json::Value>, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.result = result;
        self.locked_at = None;
        self.locked_by = None;
        self.finished_at = Some(now);
    }

    /// Apply a failed attempt: schedule a retry or fail permanently.
    pub fn mark_failed(&mut self, failure: &JobFailure, now: DateTime<Utc>) -> FailureDisposition {
        self.last_error = Some(failure.message().to_string());
        self.locked_at = None;
        self.locked_by = None;

        if !failure.is_retryable() {
            self.status = JobStatus::Failed;
            self.finished_at = Some(now);
            return FailureDisposition::Terminal;
        }

        if self.attempts < self.max_attempts {
            let delay = self.backoff.delay_for_attempt(self.attempts);
            self.status = JobStatus::Pending;
            self.run_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
            FailureDisposition::Retry { delay }
        } else {
            self.status = JobStatus::Failed;
            self.finished_at = Some(now);
            FailureDisposition::Exhausted
        }
    }
}
