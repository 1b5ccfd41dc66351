use uuid::Uuid;

use crate::entry::QueueName;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid cron schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("a worker is already registered for queue {0}")]
    DuplicateWorker(QueueName),
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
    #[error("corrupt job row {id}: {reason}")]
    CorruptRow { id: Uuid, reason: String },
}

impl QueueError {
    pub fn invalid_schedule(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            expr: expr.into(),
            reason: reason.into(),
        }
    }
}
