//! Daily re-check of every paying customer against the billing provider.

use integrations::BillingProvider;
use lead_store::Store;
use router_core::{CustomerStatus, Result};
use serde::Serialize;
use std::sync::Arc;
use telemetry::metrics;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub updated: usize,
}

pub struct PaymentReconciler {
    store: Arc<dyn Store>,
    billing: Arc<dyn BillingProvider>,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn Store>, billing: Arc<dyn BillingProvider>) -> Self {
        Self { store, billing }
    }

    /// Demote every paid customer whose billing is no longer active.
    ///
    /// A failed check fails the run. Customers demoted before the failure stay
    /// demoted and drop out of the retry's paid set.
    pub async fn run(&self) -> Result<ReconcileSummary> {
        let customers = self.store.paid_customers().await?;
        let mut summary = ReconcileSummary {
            checked: customers.len(),
            updated: 0,
        };

        for customer in &customers {
            let status = self.billing.check_payment_status(&customer.billing_id).await?;
            if status.is_active {
                continue;
            }
            if self
                .store
                .set_customer_status(customer.id, CustomerStatus::Unpaid)
                .await?
            {
                summary.updated += 1;
                metrics().customers_demoted.inc();
                info!(customer_id = %customer.id, "Customer payment inactive, demoted to unpaid");
            }
        }

        info!(checked = summary.checked, updated = summary.updated, "Payment reconciliation complete");
        Ok(summary)
    }
}
