use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::entry::{JobEntry, QueueName};

/// How a job came to fail permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The handler said retrying would not help.
    Terminal,
    /// Every attempt failed with a retryable error.
    Exhausted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminal => "terminal",
            Self::Exhausted => "exhausted",
        }
    }
}

/// A job that will not run again.
#[derive(Debug, Clone, Serialize)]
pub struct PermanentFailure {
    pub job_id: Uuid,
    pub queue: QueueName,
    pub kind: FailureKind,
    pub attempts: u32,
    pub error: String,
    /// Lead, distribution or customer the job was about, when the payload names one.
    pub entity: Option<String>,
    pub payload: serde_json::Value,
}

impl PermanentFailure {
    pub(crate) fn from_entry(entry: &JobEntry, kind: FailureKind) -> Self {
        Self {
            job_id: entry.id,
            queue: entry.queue,
            kind,
            attempts: entry.attempts,
            error: entry.last_error.clone().unwrap_or_default(),
            entity: entity_ref(&entry.payload),
            payload: entry.payload.clone(),
        }
    }
}

const ENTITY_KEYS: [&str; 4] = ["lead_id", "distribution_id", "customer_id", "document_id"];

/// First entity id found at the top level of a job payload, as `key=value`.
pub fn entity_ref(payload: &serde_json::Value) -> Option<String> {
    let obj = payload.as_object()?;
    ENTITY_KEYS.iter().find_map(|key| {
        obj.get(*key).map(|v| match v.as_str() {
            Some(s) => format!("{key}={s}"),
            None => format!("{key}={v}"),
        })
    })
}

/// Receives permanently failed jobs after they are logged and persisted.
///
/// Implementations must swallow their own errors; the runtime does not retry
/// a report.
#[async_trait]
pub trait FailureReporter: Send + Sync + 'static {
    async fn report(&self, failure: &PermanentFailure);
}
