//! Leads: region-bound opportunities sourced from external documents.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::region::RegionCode;
use crate::status::LeadStatus;

/// A persisted lead.
#[derive(Debug, Clone)]
pub struct Lead {
    pub id: Uuid,
    pub region_code: RegionCode,
    /// Document id at the source system
    pub source_ref: String,
    /// Where the source document can be fetched from
    pub source_url: Option<String>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly when the status leaves `pending`
    pub processed_at: Option<DateTime<Utc>>,
    /// Raw document bytes attached when the lead is delivered
    pub payload: Bytes,
}

impl Lead {
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }
}

/// Input for creating a lead.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub region_code: RegionCode,
    pub source_ref: String,
    pub source_url: Option<String>,
    pub payload: Bytes,
}

impl NewLead {
    /// Materialize the row as ingestion persists it: pending, unprocessed.
    pub fn into_lead(self, id: Uuid, created_at: DateTime<Utc>) -> Lead {
        Lead {
            id,
            region_code: self.region_code,
            source_ref: self.source_ref,
            source_url: self.source_url,
            status: LeadStatus::Pending,
            created_at,
            processed_at: None,
            payload: self.payload,
        }
    }
}
