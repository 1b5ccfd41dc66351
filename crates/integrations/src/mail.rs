//! Outbound mail: lead deliveries, notices and operator alerts.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use router_core::{CollaboratorErrorCode, Error, RegionCode, Result};
use serde_json::{json, Value};
use tracing::info;

use crate::config::MailConfig;
use crate::error::IntegrationError;
use crate::http::{base_url, build_client, expect_success, is_mock};

#[async_trait]
pub trait NotificationSender: Send + Sync + 'static {
    /// Deliver the lead document itself.
    async fn send_lead_payload(&self, email: &str, payload: &[u8], region: &RegionCode)
        -> Result<()>;

    /// Tell a subscriber a lead is coming after `delay_days`.
    async fn send_delayed_notice(&self, email: &str, region: &RegionCode, delay_days: u32)
        -> Result<()>;

    async fn send_payment_failure_notice(&self, email: &str, name: &str) -> Result<()>;

    async fn send_error_alert(&self, admin_email: &str, subject: &str, details: &str)
        -> Result<()>;
}

/// An attachment carried inline as base64.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: &'static str,
    pub content: Vec<u8>,
}

/// A rendered mail.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachment: Option<Attachment>,
}

impl Message {
    pub fn lead_payload(to: &str, payload: &[u8], region: &RegionCode) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("New Lead Available for PLZ: {region}"),
            text: format!("A new lead is available for your subscribed postal code {region}."),
            html: format!(
                "<h2>New Lead Notification</h2>\
                 <p>A new lead is available for your subscribed postal code {region}.</p>\
                 <p>Please find the attached PDF document with the lead details.</p>"
            ),
            attachment: Some(Attachment {
                filename: format!("lead-{region}.pdf"),
                content_type: "application/pdf",
                content: payload.to_vec(),
            }),
        }
    }

    pub fn delayed_notice(to: &str, region: &RegionCode, delay_days: u32) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Lead Notification - PLZ: {region}"),
            text: format!(
                "A new lead for PLZ {region} has been received and will be delivered in \
                 {delay_days} days due to multiple subscriptions in this area."
            ),
            html: format!(
                "<h2>Lead Notification</h2>\
                 <p>A new lead has been received for postal code {region}.</p>\
                 <p>Due to multiple subscriptions in this area, this lead will be delivered \
                 to you in {delay_days} days.</p>"
            ),
            attachment: None,
        }
    }

    pub fn payment_failure(to: &str, name: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Payment Failure Notice".to_string(),
            text: format!(
                "Dear {name}, your recent payment has failed. Please update your payment \
                 information to continue receiving leads."
            ),
            html: format!(
                "<h2>Payment Failure Notice</h2><p>Dear {name},</p>\
                 <p>Your recent payment has failed. Please update your payment information \
                 in your account dashboard to continue receiving leads.</p>"
            ),
            attachment: None,
        }
    }

    pub fn error_alert(to: &str, subject: &str, details: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("System Error Alert: {subject}"),
            text: details.to_string(),
            html: format!(
                "<h2>System Error Alert</h2><p><strong>{subject}</strong></p><pre>{details}</pre>"
            ),
            attachment: None,
        }
    }

    /// Request body for the mail API.
    pub fn to_request(&self, from: &str) -> Value {
        let mut body = json!({
            "personalizations": [{ "to": [{ "email": self.to }] }],
            "from": { "email": from },
            "subject": self.subject,
            "content": [
                { "type": "text/plain", "value": self.text },
                { "type": "text/html", "value": self.html },
            ],
        });
        if let Some(att) = &self.attachment {
            body["attachments"] = json!([{
                "content": STANDARD.encode(&att.content),
                "filename": att.filename,
                "type": att.content_type,
                "disposition": "attachment",
            }]);
        }
        body
    }
}

/// HTTP client for the mail API. A `mock` base URL logs instead of sending.
pub struct HttpMailer {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: String,
    from_email: String,
    timeout_secs: u64,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let base = if is_mock(&config.base_url) {
            None
        } else {
            Some(base_url(&config.base_url)?)
        };
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: base,
            api_key: config.api_key.clone(),
            from_email: config.from_email.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn send(&self, operation: &'static str, message: Message) -> Result<()> {
        let Some(base) = &self.base_url else {
            info!(to = %message.to, subject = %message.subject, "Mail in mock mode, not sent");
            return Ok(());
        };
        let err = |e: IntegrationError| {
            e.into_error(CollaboratorErrorCode::Notification, operation, self.timeout_secs)
        };

        let resp = self
            .client
            .post(format!("{base}/v3/mail/send"))
            .bearer_auth(&self.api_key)
            .json(&message.to_request(&self.from_email))
            .send()
            .await
            .map_err(|e| err(e.into()))?;
        expect_success(resp).await.map_err(err)?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for HttpMailer {
    async fn send_lead_payload(
        &self,
        email: &str,
        payload: &[u8],
        region: &RegionCode,
    ) -> Result<()> {
        self.send("send_lead_payload", Message::lead_payload(email, payload, region))
            .await
    }

    async fn send_delayed_notice(
        &self,
        email: &str,
        region: &RegionCode,
        delay_days: u32,
    ) -> Result<()> {
        self.send("send_delayed_notice", Message::delayed_notice(email, region, delay_days))
            .await
    }

    async fn send_payment_failure_notice(&self, email: &str, name: &str) -> Result<()> {
        self.send("send_payment_failure_notice", Message::payment_failure(email, name))
            .await
    }

    async fn send_error_alert(&self, admin_email: &str, subject: &str, details: &str) -> Result<()> {
        if admin_email.is_empty() {
            return Err(Error::config("admin email is empty"));
        }
        self.send("send_error_alert", Message::error_alert(admin_email, subject, details))
            .await
    }
}
