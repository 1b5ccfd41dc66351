//! The store capability the distribution pipeline depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use router_core::{
    Customer, CustomerStatus, Distribution, DistributionStatus, DueDistribution, Lead, LeadStatus,
    NewCustomer, NewLead, RegionCode, Result, Subscription,
};
use uuid::Uuid;

/// Row-level access to leads, customers, subscriptions and distributions.
///
/// Every state transition is a single conditional row update; there are no
/// in-process locks. Methods that finalize a row only act on rows that are
/// still pending and report whether they did.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // Leads

    async fn insert_lead(&self, lead: NewLead, now: DateTime<Utc>) -> Result<Lead>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>>;

    /// Move a pending lead to `status` and stamp `processed_at`. Returns false
    /// when the lead was no longer pending.
    async fn finalize_lead(&self, id: Uuid, status: LeadStatus, at: DateTime<Utc>)
        -> Result<bool>;

    // Customers

    /// Paid customers holding an active subscription for `region`, each once.
    async fn eligible_subscribers(&self, region: &RegionCode) -> Result<Vec<Customer>>;

    async fn paid_customers(&self) -> Result<Vec<Customer>>;

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>>;

    async fn find_customer_by_billing_id(&self, billing_id: &str) -> Result<Option<Customer>>;

    async fn insert_customer(&self, customer: NewCustomer, now: DateTime<Utc>) -> Result<Customer>;

    /// Last write wins. Returns false when no such customer exists.
    async fn set_customer_status(&self, id: Uuid, status: CustomerStatus) -> Result<bool>;

    /// Set the status of the customer with `billing_id`; a `paid_at` also
    /// records the payment time.
    async fn set_customer_status_by_billing_id(
        &self,
        billing_id: &str,
        status: CustomerStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Customer>>;

    // Subscriptions

    async fn insert_subscription(
        &self,
        customer_id: Uuid,
        region: RegionCode,
        now: DateTime<Utc>,
    ) -> Result<Subscription>;

    async fn list_subscriptions(&self, customer_id: Uuid) -> Result<Vec<Subscription>>;

    /// Cancel every active subscription of a customer. Returns how many changed.
    async fn cancel_subscriptions(&self, customer_id: Uuid, at: DateTime<Utc>) -> Result<u64>;

    // Distributions

    /// Create the pending distribution for (lead, customer) unless one
    /// already exists. Returns the row and whether it was created now.
    async fn ensure_distribution(
        &self,
        lead_id: Uuid,
        customer_id: Uuid,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(Distribution, bool)>;

    /// Pending distributions scheduled at or before `now` whose lead is
    /// scheduled, oldest first. Rows left by a failed immediate delivery
    /// belong to the distribute job and are skipped.
    async fn due_distributions(&self, now: DateTime<Utc>) -> Result<Vec<DueDistribution>>;

    /// Move a pending distribution to a final status. Returns false when it
    /// was already final.
    async fn finalize_distribution(
        &self,
        id: Uuid,
        status: DistributionStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    async fn get_distribution(&self, id: Uuid) -> Result<Option<Distribution>>;

    async fn distributions_for_lead(&self, lead_id: Uuid) -> Result<Vec<Distribution>>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<()>;
}
