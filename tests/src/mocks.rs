//! Recording test doubles for the collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use integrations::{
    extract_postal_code, parse_event, verify_signature, BillingEvent, BillingProvider,
    DocumentRef, DocumentSource, ExtractedRegion, NotificationSender, PaymentStatus,
};
use parking_lot::Mutex;
use router_core::{CollaboratorErrorCode, Error, RegionCode, Result};
use std::collections::HashSet;
use std::sync::Arc;

use crate::fixtures::WEBHOOK_SECRET;

/// Billing provider whose customers are active unless told otherwise.
#[derive(Clone, Default)]
pub struct MockBilling {
    inactive: Arc<Mutex<HashSet<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    checks: Arc<Mutex<Vec<String>>>,
    customers: Arc<Mutex<Vec<(String, String)>>>,
    subscriptions: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl MockBilling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_inactive(&self, billing_id: &str) {
        self.inactive.lock().insert(billing_id.to_string());
    }

    pub fn set_active(&self, billing_id: &str) {
        self.inactive.lock().remove(billing_id);
    }

    /// Payment checks for `billing_id` fail with a retryable error.
    pub fn fail_checks_for(&self, billing_id: &str) {
        self.failing.lock().insert(billing_id.to_string());
    }

    pub fn heal(&self, billing_id: &str) {
        self.failing.lock().remove(billing_id);
    }

    /// Billing ids checked so far, in order.
    pub fn checks(&self) -> Vec<String> {
        self.checks.lock().clone()
    }

    pub fn created_customers(&self) -> Vec<(String, String)> {
        self.customers.lock().clone()
    }

    pub fn created_subscriptions(&self) -> Vec<(String, Vec<String>)> {
        self.subscriptions.lock().clone()
    }
}

#[async_trait]
impl BillingProvider for MockBilling {
    async fn create_customer(&self, email: &str, _name: &str) -> Result<String> {
        let mut customers = self.customers.lock();
        let id = format!("cus_{}", customers.len() + 1);
        customers.push((id.clone(), email.to_string()));
        Ok(id)
    }

    async fn create_subscriptions_for_regions(
        &self,
        billing_id: &str,
        regions: &[RegionCode],
    ) -> Result<()> {
        self.subscriptions.lock().push((
            billing_id.to_string(),
            regions.iter().map(|r| r.to_string()).collect(),
        ));
        Ok(())
    }

    async fn check_payment_status(&self, billing_id: &str) -> Result<PaymentStatus> {
        self.checks.lock().push(billing_id.to_string());
        if self.failing.lock().contains(billing_id) {
            return Err(Error::collaborator(
                CollaboratorErrorCode::Billing,
                format!("check_payment_status: HTTP 503 for {billing_id}"),
            ));
        }
        Ok(PaymentStatus {
            is_active: !self.inactive.lock().contains(billing_id),
        })
    }

    fn decode_webhook(&self, payload: &[u8], signature: &str) -> Result<BillingEvent> {
        verify_signature(payload, signature, WEBHOOK_SECRET, 300, Utc::now())?;
        Ok(parse_event(payload)?)
    }
}

/// A mail the mock sender accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMail {
    LeadPayload { to: String, region: String, bytes: usize },
    DelayedNotice { to: String, region: String, days: u32 },
    PaymentFailure { to: String, name: String },
    ErrorAlert { to: String, subject: String, details: String },
}

impl SentMail {
    pub fn recipient(&self) -> &str {
        match self {
            Self::LeadPayload { to, .. }
            | Self::DelayedNotice { to, .. }
            | Self::PaymentFailure { to, .. }
            | Self::ErrorAlert { to, .. } => to,
        }
    }
}

/// Notification sender that records instead of sending.
#[derive(Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send to `email` fails with a retryable error.
    pub fn fail_for(&self, email: &str) {
        self.failing.lock().insert(email.to_string());
    }

    pub fn heal(&self, email: &str) {
        self.failing.lock().remove(email);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    pub fn lead_payloads(&self) -> Vec<SentMail> {
        self.sent()
            .into_iter()
            .filter(|m| matches!(m, SentMail::LeadPayload { .. }))
            .collect()
    }

    pub fn delayed_notices(&self) -> Vec<SentMail> {
        self.sent()
            .into_iter()
            .filter(|m| matches!(m, SentMail::DelayedNotice { .. }))
            .collect()
    }

    pub fn alerts(&self) -> Vec<SentMail> {
        self.sent()
            .into_iter()
            .filter(|m| matches!(m, SentMail::ErrorAlert { .. }))
            .collect()
    }

    fn record(&self, mail: SentMail) -> Result<()> {
        if self.failing.lock().contains(mail.recipient()) {
            return Err(Error::collaborator(
                CollaboratorErrorCode::Notification,
                format!("mail to {} rejected", mail.recipient()),
            ));
        }
        self.sent.lock().push(mail);
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for MockMailer {
    async fn send_lead_payload(&self, email: &str, payload: &[u8], region: &RegionCode) -> Result<()> {
        self.record(SentMail::LeadPayload {
            to: email.to_string(),
            region: region.to_string(),
            bytes: payload.len(),
        })
    }

    async fn send_delayed_notice(&self, email: &str, region: &RegionCode, delay_days: u32) -> Result<()> {
        self.record(SentMail::DelayedNotice {
            to: email.to_string(),
            region: region.to_string(),
            days: delay_days,
        })
    }

    async fn send_payment_failure_notice(&self, email: &str, name: &str) -> Result<()> {
        self.record(SentMail::PaymentFailure {
            to: email.to_string(),
            name: name.to_string(),
        })
    }

    async fn send_error_alert(&self, admin_email: &str, subject: &str, details: &str) -> Result<()> {
        self.record(SentMail::ErrorAlert {
            to: admin_email.to_string(),
            subject: subject.to_string(),
            details: details.to_string(),
        })
    }
}

/// Document source serving documents added by the test.
#[derive(Clone, Default)]
pub struct MockDocumentSource {
    documents: Arc<Mutex<Vec<(DocumentRef, Bytes)>>>,
    processed: Arc<Mutex<Vec<String>>>,
    fail_mark: Arc<Mutex<bool>>,
}

impl MockDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&self, id: &str, content: impl Into<Bytes>) {
        self.documents.lock().push((
            DocumentRef {
                id: id.to_string(),
                location: Some(format!("https://documents.example.com/{id}.pdf")),
            },
            content.into(),
        ));
    }

    /// Ids marked processed, in order.
    pub fn processed(&self) -> Vec<String> {
        self.processed.lock().clone()
    }

    pub fn set_mark_failure(&self, fail: bool) {
        *self.fail_mark.lock() = fail;
    }
}

#[async_trait]
impl DocumentSource for MockDocumentSource {
    async fn list_new_documents(&self) -> Result<Vec<DocumentRef>> {
        let processed = self.processed.lock().clone();
        Ok(self
            .documents
            .lock()
            .iter()
            .filter(|(doc, _)| !processed.contains(&doc.id))
            .map(|(doc, _)| doc.clone())
            .collect())
    }

    async fn download_document(&self, id: &str) -> Result<Bytes> {
        self.documents
            .lock()
            .iter()
            .find(|(doc, _)| doc.id == id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| {
                Error::collaborator_rejected(
                    CollaboratorErrorCode::DocumentSource,
                    format!("download_document: HTTP 404 for {id}"),
                )
            })
    }

    async fn extract_region_code(&self, content: &[u8]) -> Result<ExtractedRegion> {
        extract_postal_code(content)
    }

    async fn mark_document_processed(&self, id: &str) -> Result<()> {
        if *self.fail_mark.lock() {
            return Err(Error::collaborator(
                CollaboratorErrorCode::DocumentSource,
                "mark_document_processed: connection reset",
            ));
        }
        self.processed.lock().push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_mailer_failure_mode() {
        let mailer = MockMailer::new();
        mailer.fail_for("down@example.com");
        let region = RegionCode::new("10115").unwrap();

        assert!(mailer.send_delayed_notice("down@example.com", &region, 3).await.is_err());
        mailer.send_delayed_notice("up@example.com", &region, 3).await.unwrap();
        assert_eq!(mailer.delayed_notices().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_billing_tracks_checks() {
        let billing = MockBilling::new();
        billing.set_inactive("cus_b");
        assert!(billing.check_payment_status("cus_a").await.unwrap().is_active);
        assert!(!billing.check_payment_status("cus_b").await.unwrap().is_active);
        assert_eq!(billing.checks(), vec!["cus_a", "cus_b"]);
    }
}
