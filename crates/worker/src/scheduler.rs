//! Wires the jobs onto a queue runtime: handlers, pool sizes and recurring
//! triggers.

use integrations::{BillingProvider, DocumentSource, NotificationSender};
use jobq::{JobOpts, QueueError, QueueName, QueueRuntime, RuntimeConfig, Schedule};
use lead_store::Store;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::engine::DistributionEngine;
use crate::ingestion::IngestionJob;
use crate::jobs::{
    distribution_job_opts, DistributionHandler, DistributionJob, IngestionHandler,
    ReconcileHandler, INGEST_TRIGGER, RECONCILE_TRIGGER, SWEEP_TRIGGER,
};
use crate::reconciliation::PaymentReconciler;
use crate::sweeper::Sweeper;

/// Worker pool sizes and runtime timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,
    #[serde(default = "default_distribution_concurrency")]
    pub distribution_concurrency: usize,
    #[serde(default = "default_reconcile_concurrency")]
    pub reconcile_concurrency: usize,
    /// Idle wait between claim attempts
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on one handler run
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Age after which a running job's lock is considered abandoned
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_scheduler_tick_ms")]
    pub scheduler_tick_ms: u64,
}

fn default_ingest_concurrency() -> usize {
    1
}

fn default_distribution_concurrency() -> usize {
    4
}

fn default_reconcile_concurrency() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_lock_ttl_secs() -> u64 {
    900
}

fn default_scheduler_tick_ms() -> u64 {
    5000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ingest_concurrency: default_ingest_concurrency(),
            distribution_concurrency: default_distribution_concurrency(),
            reconcile_concurrency: default_reconcile_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            scheduler_tick_ms: default_scheduler_tick_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            lock_ttl: Duration::from_secs(self.lock_ttl_secs),
            scheduler_tick: Duration::from_millis(self.scheduler_tick_ms),
        }
    }
}

/// Cron expressions for the recurring jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_ingestion_schedule")]
    pub ingestion: String,
    #[serde(default = "default_sweeper_schedule")]
    pub sweeper: String,
    #[serde(default = "default_reconciliation_schedule")]
    pub reconciliation: String,
}

fn default_ingestion_schedule() -> String {
    "*/15 * * * *".to_string()
}

fn default_sweeper_schedule() -> String {
    "0 * * * *".to_string()
}

fn default_reconciliation_schedule() -> String {
    "0 0 * * *".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingestion: default_ingestion_schedule(),
            sweeper: default_sweeper_schedule(),
            reconciliation: default_reconciliation_schedule(),
        }
    }
}

/// Parsed schedules. Building one fails on the first invalid expression.
#[derive(Debug, Clone)]
pub struct Schedules {
    pub ingestion: Schedule,
    pub sweeper: Schedule,
    pub reconciliation: Schedule,
}

impl TryFrom<&ScheduleConfig> for Schedules {
    type Error = QueueError;

    fn try_from(config: &ScheduleConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            ingestion: Schedule::parse(&config.ingestion)?,
            sweeper: Schedule::parse(&config.sweeper)?,
            reconciliation: Schedule::parse(&config.reconciliation)?,
        })
    }
}

/// Collaborators the jobs run against.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub billing: Arc<dyn BillingProvider>,
    pub mailer: Arc<dyn NotificationSender>,
    pub documents: Arc<dyn DocumentSource>,
}

impl Services {
    pub fn engine(&self) -> DistributionEngine {
        DistributionEngine::new(self.store.clone(), self.billing.clone(), self.mailer.clone())
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(self.store.clone(), self.billing.clone(), self.mailer.clone())
    }

    pub fn reconciler(&self) -> PaymentReconciler {
        PaymentReconciler::new(self.store.clone(), self.billing.clone())
    }

    pub fn ingestion(&self, runtime: Arc<QueueRuntime>) -> IngestionJob {
        IngestionJob::new(self.store.clone(), self.documents.clone(), runtime)
    }
}

/// Binds one handler per queue.
pub fn register_workers(
    runtime: &Arc<QueueRuntime>,
    services: &Services,
    config: &WorkerConfig,
) -> Result<(), QueueError> {
    runtime.register_worker(
        QueueName::DocumentIngest,
        IngestionHandler::new(services.ingestion(runtime.clone())),
        config.ingest_concurrency,
    )?;
    runtime.register_worker(
        QueueName::LeadDistribution,
        DistributionHandler::new(services.engine(), services.sweeper()),
        config.distribution_concurrency,
    )?;
    runtime.register_worker(
        QueueName::PaymentReconcile,
        ReconcileHandler::new(services.reconciler()),
        config.reconcile_concurrency,
    )?;
    Ok(())
}

/// Register (or refresh) the three recurring triggers.
pub async fn schedule_recurring(runtime: &QueueRuntime, schedules: &Schedules) -> Result<(), QueueError> {
    runtime
        .enqueue_recurring(
            INGEST_TRIGGER,
            QueueName::DocumentIngest,
            &json!({}),
            &schedules.ingestion,
            JobOpts::default(),
        )
        .await?;
    runtime
        .enqueue_recurring(
            SWEEP_TRIGGER,
            QueueName::LeadDistribution,
            &DistributionJob::SweepScheduled,
            &schedules.sweeper,
            distribution_job_opts(),
        )
        .await?;
    runtime
        .enqueue_recurring(
            RECONCILE_TRIGGER,
            QueueName::PaymentReconcile,
            &json!({}),
            &schedules.reconciliation,
            JobOpts::default(),
        )
        .await?;

    info!(
        ingestion = %schedules.ingestion,
        sweeper = %schedules.sweeper,
        reconciliation = %schedules.reconciliation,
        "Recurring jobs scheduled"
    );
    Ok(())
}
