//! Postgres-backed queue store.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so any number of processes can poll the
//! same table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::backoff::{BackoffPolicy, BackoffStrategy};
use crate::entry::{JobEntry, JobOpts, JobStatus, QueueName};
use crate::error::QueueError;
use crate::schedule::Schedule;
use crate::store::{QueueCounts, QueueStore, RecurringTrigger};

/// Tables owned by the queue.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id              UUID PRIMARY KEY,
        queue           TEXT NOT NULL,
        payload         JSONB NOT NULL,
        status          TEXT NOT NULL,
        attempts        INT NOT NULL DEFAULT 0,
        max_attempts    INT NOT NULL,
        backoff         TEXT NOT NULL,
        backoff_base_ms BIGINT NOT NULL,
        run_at          TIMESTAMPTZ NOT NULL,
        locked_at       TIMESTAMPTZ,
        locked_by       TEXT,
        last_error      TEXT,
        result          JSONB,
        recurring_key   TEXT,
        created_at      TIMESTAMPTZ NOT NULL,
        finished_at     TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS jobs_claim_idx ON jobs (queue, status, run_at)",
    r#"
    CREATE TABLE IF NOT EXISTS recurring_jobs (
        key             TEXT PRIMARY KEY,
        queue           TEXT NOT NULL,
        payload         JSONB NOT NULL,
        cron            TEXT NOT NULL,
        max_attempts    INT NOT NULL,
        backoff         TEXT NOT NULL,
        backoff_base_ms BIGINT NOT NULL,
        next_run_at     TIMESTAMPTZ NOT NULL
    )
    "#,
];

const JOB_COLUMNS: &str = "id, queue, payload, status, attempts, max_attempts, backoff, \
    backoff_base_ms, run_at, locked_at, locked_by, last_error, result, recurring_key, \
    created_at, finished_at";

#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the queue tables if they do not exist.
    pub async fn init_schema(&self) -> Result<(), QueueError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        tracing::info!("Queue schema initialized");
        Ok(())
    }
}

fn corrupt(id: Uuid, reason: impl ToString) -> QueueError {
    QueueError::CorruptRow {
        id,
        reason: reason.to_string(),
    }
}

fn backoff_from_row(row: &PgRow, id: Uuid) -> Result<BackoffPolicy, QueueError> {
    let strategy: String = row.try_get("backoff")?;
    let base_ms: i64 = row.try_get("backoff_base_ms")?;
    Ok(BackoffPolicy {
        strategy: strategy.parse::<BackoffStrategy>().map_err(|e| corrupt(id, e))?,
        base: Duration::from_millis(base_ms.max(0) as u64),
    })
}

fn entry_from_row(row: &PgRow) -> Result<JobEntry, QueueError> {
    let id: Uuid = row.try_get("id")?;
    let queue: String = row.try_get("queue")?;
    let status: String = row.try_get("status")?;
    let attempts: i32 = row.try_get("attempts")?;
    let max_attempts: i32 = row.try_get("max_attempts")?;

    Ok(JobEntry {
        id,
        queue: queue.parse().map_err(|e: QueueError| corrupt(id, e))?,
        payload: row.try_get("payload")?,
        status: status.parse().map_err(|e: String| corrupt(id, e))?,
        attempts: attempts.max(0) as u32,
        max_attempts: max_attempts.max(1) as u32,
        backoff: backoff_from_row(row, id)?,
        run_at: row.try_get("run_at")?,
        locked_at: row.try_get("locked_at")?,
        locked_by: row.try_get("locked_by")?,
        last_error: row.try_get("last_error")?,
        result: row.try_get("result")?,
        recurring_key: row.try_get("recurring_key")?,
        created_at: row.try_get("created_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

fn trigger_from_row(row: &PgRow) -> Result<RecurringTrigger, QueueError> {
    let key: String = row.try_get("key")?;
    let queue: String = row.try_get("queue")?;
    let cron: String = row.try_get("cron")?;
    let max_attempts: i32 = row.try_get("max_attempts")?;
    let nil = Uuid::nil();

    Ok(RecurringTrigger {
        queue: queue.parse().map_err(|e: QueueError| corrupt(nil, e))?,
        payload: row.try_get("payload")?,
        schedule: Schedule::parse(&cron)?,
        opts: JobOpts {
            attempts: max_attempts.max(1) as u32,
            backoff: backoff_from_row(row, nil)?,
            delay: None,
        },
        next_run_at: row.try_get("next_run_at")?,
        key,
    })
}

async fn insert_entry<'e, E>(executor: E, entry: &JobEntry) -> Result<(), QueueError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(&format!(
        "INSERT INTO jobs ({JOB_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
    ))
    .bind(entry.id)
    .bind(entry.queue.as_str())
    .bind(&entry.payload)
    .bind(entry.status.as_str())
    .bind(entry.attempts as i32)
    .bind(entry.max_attempts as i32)
    .bind(entry.backoff.strategy.as_str())
    .bind(entry.backoff.base_ms() as i64)
    .bind(entry.run_at)
    .bind(entry.locked_at)
    .bind(&entry.locked_by)
    .bind(&entry.last_error)
    .bind(&entry.result)
    .bind(&entry.recurring_key)
    .bind(entry.created_at)
    .bind(entry.finished_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn insert(&self, entry: &JobEntry) -> Result<(), QueueError> {
        insert_entry(&self.pool, entry).await
    }

    async fn claim_next(
        &self,
        queue: QueueName,
        worker_id: &str,
        now: DateTime<Utc>,
        lock_ttl: Duration,
    ) -> Result<Option<JobEntry>, QueueError> {
        let stale_before = now
            - chrono::Duration::from_std(lock_ttl).unwrap_or_else(|_| chrono::Duration::days(1));

        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = 'running', locked_at = $3, locked_by = $4, attempts = attempts + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = $1
                  AND ((status = 'pending' AND run_at <= $3)
                    OR (status = 'running' AND locked_at < $2))
                ORDER BY run_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(queue.as_str())
        .bind(stale_before)
        .bind(now)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn update(&self, entry: &JobEntry) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, attempts = $3, run_at = $4, locked_at = $5, locked_by = $6,
                last_error = $7, result = $8, finished_at = $9
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(entry.status.as_str())
        .bind(entry.attempts as i32)
        .bind(entry.run_at)
        .bind(entry.locked_at)
        .bind(&entry.locked_by)
        .bind(&entry.last_error)
        .bind(&entry.result)
        .bind(entry.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobEntry>, QueueError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn list(
        &self,
        queue: QueueName,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<JobEntry>, QueueError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE queue = $1 AND status = $2 \
             ORDER BY created_at DESC LIMIT $3"
        ))
        .bind(queue.as_str())
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn counts(&self, queue: QueueName) -> Result<QueueCounts, QueueError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs WHERE queue = $1 GROUP BY status")
            .bind(queue.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = n.max(0) as u64;
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Pending) => counts.pending = n,
                Ok(JobStatus::Running) => counts.running = n,
                Ok(JobStatus::Completed) => counts.completed = n,
                Ok(JobStatus::Failed) => counts.failed = n,
                Err(e) => tracing::warn!(queue = %queue, error = %e, "unknown job status in counts"),
            }
        }
        Ok(counts)
    }

    async fn upsert_recurring(&self, trigger: &RecurringTrigger) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            INSERT INTO recurring_jobs
                (key, queue, payload, cron, max_attempts, backoff, backoff_base_ms, next_run_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (key) DO UPDATE SET
                queue = EXCLUDED.queue,
                payload = EXCLUDED.payload,
                max_attempts = EXCLUDED.max_attempts,
                backoff = EXCLUDED.backoff,
                backoff_base_ms = EXCLUDED.backoff_base_ms,
                next_run_at = CASE
                    WHEN recurring_jobs.cron = EXCLUDED.cron THEN recurring_jobs.next_run_at
                    ELSE EXCLUDED.next_run_at
                END,
                cron = EXCLUDED.cron
            "#,
        )
        .bind(&trigger.key)
        .bind(trigger.queue.as_str())
        .bind(&trigger.payload)
        .bind(trigger.schedule.as_str())
        .bind(trigger.opts.attempts as i32)
        .bind(trigger.opts.backoff.strategy.as_str())
        .bind(trigger.opts.backoff.base_ms() as i64)
        .bind(trigger.next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn due_recurring(&self, now: DateTime<Utc>) -> Result<Vec<RecurringTrigger>, QueueError> {
        let rows = sqlx::query(
            "SELECT key, queue, payload, cron, max_attempts, backoff, backoff_base_ms, next_run_at \
             FROM recurring_jobs WHERE next_run_at <= $1 ORDER BY next_run_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trigger_from_row).collect()
    }

    async fn fire_recurring(
        &self,
        key: &str,
        expected_next: DateTime<Utc>,
        next: DateTime<Utc>,
        entry: &JobEntry,
    ) -> Result<bool, QueueError> {
        let mut tx = self.pool.begin().await?;

        let advanced = sqlx::query(
            "UPDATE recurring_jobs SET next_run_at = $3 WHERE key = $1 AND next_run_at = $2",
        )
        .bind(key)
        .bind(expected_next)
        .bind(next)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if advanced == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_entry(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
