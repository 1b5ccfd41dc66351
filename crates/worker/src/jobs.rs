//! Job payloads and the handlers bound to each queue.

use async_trait::async_trait;
use chrono::Utc;
use jobq::{JobContext, JobHandler, JobOpts, JobResult};
use router_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::engine::DistributionEngine;
use crate::ingestion::IngestionJob;
use crate::reconciliation::PaymentReconciler;
use crate::sweeper::Sweeper;

/// Recurring trigger keys.
pub const INGEST_TRIGGER: &str = "document-ingest:poll";
pub const SWEEP_TRIGGER: &str = "lead-distribution:sweep";
pub const RECONCILE_TRIGGER: &str = "payment-reconcile:daily";

/// Work items on the `lead-distribution` queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionJob {
    /// Route one newly ingested lead.
    Distribute { lead_id: Uuid },
    /// Finalize deferred distributions that are due.
    SweepScheduled,
}

/// Three attempts, exponential backoff from 5s.
pub fn distribution_job_opts() -> JobOpts {
    JobOpts::default()
}

pub struct DistributionHandler {
    engine: DistributionEngine,
    sweeper: Sweeper,
}

impl DistributionHandler {
    pub fn new(engine: DistributionEngine, sweeper: Sweeper) -> Self {
        Self { engine, sweeper }
    }
}

#[async_trait]
impl JobHandler for DistributionHandler {
    async fn handle(&self, ctx: JobContext) -> JobResult {
        match ctx.payload::<DistributionJob>()? {
            DistributionJob::Distribute { lead_id } => {
                let outcome = self.engine.process_lead_by_id(lead_id).await?;
                info!(lead_id = %lead_id, outcome = outcome.as_str(), "Lead processed");
                let mut result = serde_json::to_value(&outcome).map_err(Error::from)?;
                result["lead_id"] = json!(lead_id);
                Ok(Some(result))
            }
            DistributionJob::SweepScheduled => {
                let summary = self.sweeper.sweep(Utc::now()).await?;
                Ok(Some(serde_json::to_value(summary).map_err(Error::from)?))
            }
        }
    }
}

pub struct IngestionHandler {
    job: IngestionJob,
}

impl IngestionHandler {
    pub fn new(job: IngestionJob) -> Self {
        Self { job }
    }
}

#[async_trait]
impl JobHandler for IngestionHandler {
    async fn handle(&self, _ctx: JobContext) -> JobResult {
        let summary = self.job.run().await?;
        Ok(Some(serde_json::to_value(summary).map_err(Error::from)?))
    }
}

pub struct ReconcileHandler {
    reconciler: PaymentReconciler,
}

impl ReconcileHandler {
    pub fn new(reconciler: PaymentReconciler) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl JobHandler for ReconcileHandler {
    async fn handle(&self, _ctx: JobContext) -> JobResult {
        let summary = self.reconciler.run().await?;
        Ok(Some(serde_json::to_value(summary).map_err(Error::from)?))
    }
}
