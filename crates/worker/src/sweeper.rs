//! Finalizes deferred distributions once they fall due.

use chrono::{DateTime, Utc};
use integrations::{BillingProvider, NotificationSender};
use lead_store::Store;
use router_core::{DistributionStatus, DueDistribution, Result};
use serde::Serialize;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub due: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Rows left pending because a collaborator call failed; the next sweep
    /// picks them up again.
    pub failed: usize,
}

enum RowOutcome {
    Completed,
    Cancelled,
    /// Another sweep finalized the row first.
    AlreadyFinal,
}

pub struct Sweeper {
    store: Arc<dyn Store>,
    billing: Arc<dyn BillingProvider>,
    mailer: Arc<dyn NotificationSender>,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn Store>,
        billing: Arc<dyn BillingProvider>,
        mailer: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            store,
            billing,
            mailer,
        }
    }

    /// Process every distribution due at `now`. Only failing to load the due
    /// rows fails the sweep; each row is handled on its own.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let due = self.store.due_distributions(now).await?;
        let mut summary = SweepSummary {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!("No distributions due");
            return Ok(summary);
        }

        for row in &due {
            match self.finalize(row, now).await {
                Ok(RowOutcome::Completed) => summary.completed += 1,
                Ok(RowOutcome::Cancelled) => summary.cancelled += 1,
                Ok(RowOutcome::AlreadyFinal) => {}
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        distribution_id = %row.distribution.id,
                        lead_id = %row.distribution.lead_id,
                        customer_id = %row.distribution.customer_id,
                        error = %e,
                        "Scheduled distribution failed, left pending"
                    );
                }
            }
        }

        info!(
            due = summary.due,
            completed = summary.completed,
            cancelled = summary.cancelled,
            failed = summary.failed,
            "Sweep complete"
        );
        Ok(summary)
    }

    async fn finalize(&self, row: &DueDistribution, now: DateTime<Utc>) -> Result<RowOutcome> {
        let id = row.distribution.id;
        let status = self.billing.check_payment_status(&row.billing_id).await?;

        if !status.is_active {
            if !self
                .store
                .finalize_distribution(id, DistributionStatus::Cancelled, None)
                .await?
            {
                return Ok(RowOutcome::AlreadyFinal);
            }
            metrics().distributions_cancelled.inc();
            info!(distribution_id = %id, customer_id = %row.distribution.customer_id, "Subscriber inactive, distribution cancelled");
            return Ok(RowOutcome::Cancelled);
        }

        self.mailer
            .send_lead_payload(&row.email, &row.payload, &row.region_code)
            .await?;
        if !self
            .store
            .finalize_distribution(id, DistributionStatus::Completed, Some(now))
            .await?
        {
            return Ok(RowOutcome::AlreadyFinal);
        }
        metrics().distributions_completed.inc();
        debug!(distribution_id = %id, "Scheduled distribution delivered");
        Ok(RowOutcome::Completed)
    }
}
