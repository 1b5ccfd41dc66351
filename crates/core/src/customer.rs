//! Subscribers and their region subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::region::RegionCode;
use crate::status::{CustomerStatus, SubscriptionStatus};

/// A billing-account holder that can receive leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// Customer reference at the billing provider
    pub billing_id: String,
    pub status: CustomerStatus,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Only paid customers may receive leads.
    pub fn is_paid(&self) -> bool {
        self.status == CustomerStatus::Paid
    }
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub email: String,
    pub name: String,
    pub billing_id: String,
}

/// Binds a customer to one region code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub region_code: RegionCode,
    pub status: SubscriptionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
