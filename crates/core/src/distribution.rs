//! Deliveries of one lead to one subscriber.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::region::RegionCode;
use crate::status::DistributionStatus;

/// Fixed deferral applied when several subscribers contend for a region.
pub const DELAYED_DISTRIBUTION_DAYS: u32 = 3;

/// When a deferred distribution created at `now` becomes due.
pub fn delayed_schedule(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(i64::from(DELAYED_DISTRIBUTION_DAYS))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub customer_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub status: DistributionStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Distribution {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DistributionStatus::Pending && self.scheduled_for <= now
    }
}

/// A due distribution joined with what the sweeper needs to act on it.
#[derive(Debug, Clone)]
pub struct DueDistribution {
    pub distribution: Distribution,
    pub region_code: RegionCode,
    pub payload: Bytes,
    pub email: String,
    pub billing_id: String,
}
