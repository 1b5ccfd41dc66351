//! Customer onboarding and billing webhook events.

use chrono::{DateTime, Utc};
use integrations::{BillingEvent, BillingProvider, NotificationSender};
use lead_store::Store;
use router_core::{Customer, CustomerStatus, Error, NewCustomer, RegionCode, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{info, warn};

/// What a billing event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEffect {
    MarkedPaid,
    MarkedUnpaid,
    SubscriptionsCancelled(u64),
    /// The event named a customer this system does not know.
    UnknownCustomer,
    Ignored,
}

pub struct AccountService {
    store: Arc<dyn Store>,
    billing: Arc<dyn BillingProvider>,
    mailer: Arc<dyn NotificationSender>,
}

impl AccountService {
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

    pub fn billing(&self) -> &Arc<dyn BillingProvider> {
        &self.billing
    }

    /// Create a customer with the billing provider and locally.
    ///
    /// The customer starts unpaid; the first successful payment event flips
    /// it to paid. Duplicate regions collapse into one subscription.
    pub async fn register_customer(
        &self,
        email: &str,
        name: &str,
        regions: &[String],
    ) -> Result<Customer> {
        let regions = regions
            .iter()
            .map(RegionCode::new)
            .collect::<Result<BTreeSet<_>>>()?
            .into_iter()
            .collect::<Vec<_>>();
        if regions.is_empty() {
            return Err(Error::invalid_payload("at least one region is required"));
        }

        let billing_id = self.billing.create_customer(email, name).await?;
        self.billing
            .create_subscriptions_for_regions(&billing_id, &regions)
            .await?;

        let now = Utc::now();
        let customer = self
            .store
            .insert_customer(
                NewCustomer {
                    email: email.to_string(),
                    name: name.to_string(),
                    billing_id,
                },
                now,
            )
            .await?;
        for region in &regions {
            self.store
                .insert_subscription(customer.id, region.clone(), now)
                .await?;
        }

        info!(customer_id = %customer.id, regions = regions.len(), "Customer registered");
        Ok(customer)
    }

    /// Apply a verified billing event.
    pub async fn apply_billing_event(
        &self,
        event: &BillingEvent,
        now: DateTime<Utc>,
    ) -> Result<EventEffect> {
        match event {
            BillingEvent::PaymentSucceeded { customer } => {
                let updated = self
                    .store
                    .set_customer_status_by_billing_id(customer, CustomerStatus::Paid, Some(now))
                    .await?;
                Ok(match updated {
                    Some(c) => {
                        info!(customer_id = %c.id, "Payment succeeded, customer marked paid");
                        EventEffect::MarkedPaid
                    }
                    None => unknown(customer),
                })
            }
            BillingEvent::PaymentFailed { customer } => {
                let Some(c) = self
                    .store
                    .set_customer_status_by_billing_id(customer, CustomerStatus::Unpaid, None)
                    .await?
                else {
                    return Ok(unknown(customer));
                };
                info!(customer_id = %c.id, "Payment failed, customer marked unpaid");
                // The status change stands even when the notice cannot be sent.
                if let Err(e) = self.mailer.send_payment_failure_notice(&c.email, &c.name).await {
                    metrics().notifications_failed.inc();
                    warn!(customer_id = %c.id, error = %e, "Payment failure notice not sent");
                }
                Ok(EventEffect::MarkedUnpaid)
            }
            BillingEvent::SubscriptionCancelled { customer } => {
                let Some(c) = self.store.find_customer_by_billing_id(customer).await? else {
                    return Ok(unknown(customer));
                };
                let cancelled = self.store.cancel_subscriptions(c.id, now).await?;
                info!(customer_id = %c.id, cancelled, "Subscriptions cancelled");
                Ok(EventEffect::SubscriptionsCancelled(cancelled))
            }
            BillingEvent::Ignored { event_type } => {
                info!(event_type = %event_type, "Ignoring billing event");
                Ok(EventEffect::Ignored)
            }
        }
    }
}

fn unknown(billing_id: &str) -> EventEffect {
    warn!(billing_id = %billing_id, "Billing event for unknown customer");
    EventEffect::UnknownCustomer
}
