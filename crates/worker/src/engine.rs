//! Distribution engine: decides who gets a new lead and when.
//!
//! - no eligible subscriber: the lead is unassigned
//! - one: delivered now, after a live payment check
//! - several: everyone is told a lead is coming and delivery is deferred by
//!   [`DELAYED_DISTRIBUTION_DAYS`] so the sweeper can re-check eligibility.
//!   A subscriber gets a distribution row only once their notice is sent.

use chrono::{DateTime, Utc};
use integrations::{BillingProvider, NotificationSender};
use lead_store::Store;
use router_core::{
    delayed_schedule, Customer, CustomerStatus, DistributionStatus, Error, Lead, LeadStatus,
    Result, DELAYED_DISTRIBUTION_DAYS,
};
use serde::Serialize;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What processing a lead led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DistributionOutcome {
    Unassigned,
    Distributed {
        customer_id: Uuid,
        distribution_id: Uuid,
    },
    Scheduled {
        distributions: usize,
        scheduled_for: DateTime<Utc>,
    },
    /// The only eligible subscriber failed the live payment check. The lead
    /// stays pending and nothing re-enqueues it.
    Stranded { customer_id: Uuid },
}

impl DistributionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Distributed { .. } => "distributed",
            Self::Scheduled { .. } => "scheduled",
            Self::Stranded { .. } => "stranded",
        }
    }
}

pub struct DistributionEngine {
    store: Arc<dyn Store>,
    billing: Arc<dyn BillingProvider>,
    mailer: Arc<dyn NotificationSender>,
}

impl DistributionEngine {
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

    /// Load a lead and process it. A missing or already processed lead is an
    /// integrity error.
    pub async fn process_lead_by_id(&self, lead_id: Uuid) -> Result<DistributionOutcome> {
        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or(Error::LeadNotFound(lead_id))?;
        if !lead.is_pending() {
            return Err(Error::LeadNotPending {
                id: lead.id,
                status: lead.status,
            });
        }
        self.process_new_lead(&lead, Utc::now()).await
    }

    /// Route a pending lead. `now` is the processing time stamped on the lead
    /// and its distributions.
    pub async fn process_new_lead(&self, lead: &Lead, now: DateTime<Utc>) -> Result<DistributionOutcome> {
        let subscribers = self.store.eligible_subscribers(&lead.region_code).await?;
        debug!(
            lead_id = %lead.id,
            region_code = %lead.region_code,
            eligible = subscribers.len(),
            "Resolved eligible subscribers"
        );

        match subscribers.as_slice() {
            [] => self.mark_unassigned(lead, now).await,
            [only] => self.distribute_immediately(lead, only, now).await,
            _ => self.schedule_delayed(lead, &subscribers, now).await,
        }
    }

    async fn mark_unassigned(&self, lead: &Lead, now: DateTime<Utc>) -> Result<DistributionOutcome> {
        self.store.finalize_lead(lead.id, LeadStatus::Unassigned, now).await?;
        metrics().leads_unassigned.inc();
        info!(lead_id = %lead.id, region_code = %lead.region_code, "No eligible subscriber, lead unassigned");
        Ok(DistributionOutcome::Unassigned)
    }

    async fn distribute_immediately(
        &self,
        lead: &Lead,
        customer: &Customer,
        now: DateTime<Utc>,
    ) -> Result<DistributionOutcome> {
        let status = self.billing.check_payment_status(&customer.billing_id).await?;
        if !status.is_active {
            self.store
                .set_customer_status(customer.id, CustomerStatus::Unpaid)
                .await?;
            metrics().customers_demoted.inc();
            metrics().leads_stranded.inc();
            warn!(
                lead_id = %lead.id,
                customer_id = %customer.id,
                "Sole subscriber failed payment check, demoted; lead left pending"
            );
            return Ok(DistributionOutcome::Stranded {
                customer_id: customer.id,
            });
        }

        let (distribution, _) = self
            .store
            .ensure_distribution(lead.id, customer.id, now, now)
            .await?;

        // A retry after a successful send finds the row already completed.
        if distribution.status == DistributionStatus::Pending {
            self.mailer
                .send_lead_payload(&customer.email, &lead.payload, &lead.region_code)
                .await?;
            self.store
                .finalize_distribution(distribution.id, DistributionStatus::Completed, Some(now))
                .await?;
            metrics().distributions_completed.inc();
        }

        self.store.finalize_lead(lead.id, LeadStatus::Distributed, now).await?;
        metrics().leads_distributed.inc();
        info!(
            lead_id = %lead.id,
            customer_id = %customer.id,
            distribution_id = %distribution.id,
            "Lead distributed"
        );

        Ok(DistributionOutcome::Distributed {
            customer_id: customer.id,
            distribution_id: distribution.id,
        })
    }

    async fn schedule_delayed(
        &self,
        lead: &Lead,
        subscribers: &[Customer],
        now: DateTime<Utc>,
    ) -> Result<DistributionOutcome> {
        // Rows from an earlier attempt keep their slot; their notice went out.
        let existing = self.store.distributions_for_lead(lead.id).await?;
        let scheduled_for = existing
            .iter()
            .map(|d| d.scheduled_for)
            .min()
            .unwrap_or_else(|| delayed_schedule(now));

        let mut retry = None;
        for customer in subscribers {
            if existing.iter().any(|d| d.customer_id == customer.id) {
                continue;
            }
            // Notice first: a subscriber without a row is re-notified on retry.
            if let Err(e) = self
                .mailer
                .send_delayed_notice(&customer.email, &lead.region_code, DELAYED_DISTRIBUTION_DAYS)
                .await
            {
                metrics().notifications_failed.inc();
                warn!(
                    lead_id = %lead.id,
                    customer_id = %customer.id,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Delayed notice failed"
                );
                if e.is_retryable() {
                    retry.get_or_insert(e);
                    continue;
                }
            }
            self.store
                .ensure_distribution(lead.id, customer.id, scheduled_for, now)
                .await?;
        }

        // The lead stays pending so the job retries the missing notices.
        if let Some(e) = retry {
            return Err(e);
        }

        self.store.finalize_lead(lead.id, LeadStatus::Scheduled, now).await?;
        metrics().leads_scheduled.inc();
        info!(
            lead_id = %lead.id,
            subscribers = subscribers.len(),
            scheduled_for = %scheduled_for,
            "Lead scheduled for delayed distribution"
        );

        Ok(DistributionOutcome::Scheduled {
            distributions: subscribers.len(),
            scheduled_for,
        })
    }
}
