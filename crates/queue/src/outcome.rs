//! Job handler contract.
//!
//! Handlers return a [`JobResult`]. The runtime is the only place that turns a
//! [`JobFailure`] into a retry or a permanent failure.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use uuid::Uuid;

use crate::entry::QueueName;

/// Why a job attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// Transient; the job is retried under its backoff policy.
    Retryable(String),
    /// Retrying cannot help; the job fails immediately.
    Terminal(String),
}

impl JobFailure {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Terminal(msg) => msg,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for JobFailure {}

impl From<router_core::Error> for JobFailure {
    fn from(e: router_core::Error) -> Self {
        if e.is_retryable() {
            Self::Retryable(e.to_string())
        } else {
            Self::Terminal(e.to_string())
        }
    }
}

/// Ok carries an optional summary stored on the job row.
pub type JobResult = Result<Option<serde_json::Value>, JobFailure>;

/// What a handler sees of the job it is running.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: Uuid,
    pub queue: QueueName,
    /// 1 on the first run.
    pub attempt: u32,
    pub max_attempts: u32,
    pub payload: serde_json::Value,
}

impl JobContext {
    /// Decode the payload. A payload that does not decode never will, so the
    /// failure is terminal.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, JobFailure> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| JobFailure::terminal(format!("undecodable payload: {e}")))
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Consumes jobs from exactly one queue.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: JobContext) -> JobResult;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    async fn handle(&self, ctx: JobContext) -> JobResult {
        (self)(ctx).await
    }
}
