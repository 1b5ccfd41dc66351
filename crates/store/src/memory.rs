//! In-memory [`Store`] for development and tests. Not durable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use router_core::{
    Customer, CustomerStatus, Distribution, DistributionStatus, DueDistribution, Error, Lead,
    LeadStatus, NewCustomer, NewLead, RegionCode, Result, Subscription, SubscriptionStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::Store;

#[derive(Default)]
struct Tables {
    leads: HashMap<Uuid, Lead>,
    customers: Vec<Customer>,
    subscriptions: Vec<Subscription>,
    distributions: Vec<Distribution>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.tables.lock().leads.values().cloned().collect()
    }

    pub fn distributions(&self) -> Vec<Distribution> {
        self.tables.lock().distributions.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_lead(&self, lead: NewLead, now: DateTime<Utc>) -> Result<Lead> {
        let lead = lead.into_lead(Uuid::new_v4(), now);
        self.tables.lock().leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        Ok(self.tables.lock().leads.get(&id).cloned())
    }

    async fn finalize_lead(
        &self,
        id: Uuid,
        status: LeadStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock();
        match tables.leads.get_mut(&id) {
            Some(lead) if lead.is_pending() => {
                lead.status = status;
                lead.processed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn eligible_subscribers(&self, region: &RegionCode) -> Result<Vec<Customer>> {
        let tables = self.tables.lock();
        Ok(tables
            .customers
            .iter()
            .filter(|c| c.is_paid())
            .filter(|c| {
                tables
                    .subscriptions
                    .iter()
                    .any(|s| s.customer_id == c.id && s.is_active() && &s.region_code == region)
            })
            .cloned()
            .collect())
    }

    async fn paid_customers(&self) -> Result<Vec<Customer>> {
        let tables = self.tables.lock();
        Ok(tables.customers.iter().filter(|c| c.is_paid()).cloned().collect())
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let tables = self.tables.lock();
        Ok(tables.customers.iter().find(|c| c.id == id).cloned())
    }

    async fn find_customer_by_billing_id(&self, billing_id: &str) -> Result<Option<Customer>> {
        let tables = self.tables.lock();
        Ok(tables
            .customers
            .iter()
            .find(|c| c.billing_id == billing_id)
            .cloned())
    }

    async fn insert_customer(&self, customer: NewCustomer, now: DateTime<Utc>) -> Result<Customer> {
        let mut tables = self.tables.lock();
        if tables
            .customers
            .iter()
            .any(|c| c.billing_id == customer.billing_id)
        {
            return Err(Error::database(
                router_core::DbErrorCode::QueryFailed,
                format!("duplicate billing id {}", customer.billing_id),
            ));
        }
        let customer = Customer {
            id: Uuid::new_v4(),
            email: customer.email,
            name: customer.name,
            billing_id: customer.billing_id,
            status: CustomerStatus::Unpaid,
            last_payment_at: None,
            created_at: now,
        };
        tables.customers.push(customer.clone());
        Ok(customer)
    }

    async fn set_customer_status(&self, id: Uuid, status: CustomerStatus) -> Result<bool> {
        let mut tables = self.tables.lock();
        match tables.customers.iter_mut().find(|c| c.id == id) {
            Some(customer) => {
                customer.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_customer_status_by_billing_id(
        &self,
        billing_id: &str,
        status: CustomerStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Customer>> {
        let mut tables = self.tables.lock();
        Ok(tables
            .customers
            .iter_mut()
            .find(|c| c.billing_id == billing_id)
            .map(|customer| {
                customer.status = status;
                if paid_at.is_some() {
                    customer.last_payment_at = paid_at;
                }
                customer.clone()
            }))
    }

    async fn insert_subscription(
        &self,
        customer_id: Uuid,
        region: RegionCode,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            customer_id,
            region_code: region,
            status: SubscriptionStatus::Active,
            started_at: now,
            ended_at: None,
        };
        self.tables.lock().subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn list_subscriptions(&self, customer_id: Uuid) -> Result<Vec<Subscription>> {
        let tables = self.tables.lock();
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn cancel_subscriptions(&self, customer_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock();
        let mut cancelled = 0;
        for s in tables
            .subscriptions
            .iter_mut()
            .filter(|s| s.customer_id == customer_id && s.is_active())
        {
            s.status = SubscriptionStatus::Cancelled;
            s.ended_at = Some(at);
            cancelled += 1;
        }
        Ok(cancelled)
    }

    async fn ensure_distribution(
        &self,
        lead_id: Uuid,
        customer_id: Uuid,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(Distribution, bool)> {
        let mut tables = self.tables.lock();
        if let Some(existing) = tables
            .distributions
            .iter()
            .find(|d| d.lead_id == lead_id && d.customer_id == customer_id)
        {
            return Ok((existing.clone(), false));
        }
        let distribution = Distribution {
            id: Uuid::new_v4(),
            lead_id,
            customer_id,
            scheduled_for,
            status: DistributionStatus::Pending,
            sent_at: None,
            created_at: now,
        };
        tables.distributions.push(distribution.clone());
        Ok((distribution, true))
    }

    async fn due_distributions(&self, now: DateTime<Utc>) -> Result<Vec<DueDistribution>> {
        let tables = self.tables.lock();
        let mut due: Vec<DueDistribution> = tables
            .distributions
            .iter()
            .filter(|d| d.is_due(now))
            .filter_map(|d| {
                let lead = tables
                    .leads
                    .get(&d.lead_id)
                    .filter(|l| l.status == LeadStatus::Scheduled)?;
                let customer = tables.customers.iter().find(|c| c.id == d.customer_id)?;
                Some(DueDistribution {
                    distribution: d.clone(),
                    region_code: lead.region_code.clone(),
                    payload: lead.payload.clone(),
                    email: customer.email.clone(),
                    billing_id: customer.billing_id.clone(),
                })
            })
            .collect();
        due.sort_by_key(|d| d.distribution.scheduled_for);
        Ok(due)
    }

    async fn finalize_distribution(
        &self,
        id: Uuid,
        status: DistributionStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock();
        match tables.distributions.iter_mut().find(|d| d.id == id) {
            Some(d) if !d.status.is_final() => {
                d.status = status;
                d.sent_at = sent_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_distribution(&self, id: Uuid) -> Result<Option<Distribution>> {
        let tables = self.tables.lock();
        Ok(tables.distributions.iter().find(|d| d.id == id).cloned())
    }

    async fn distributions_for_lead(&self, lead_id: Uuid) -> Result<Vec<Distribution>> {
        let tables = self.tables.lock();
        Ok(tables
            .distributions
            .iter()
            .filter(|d| d.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
