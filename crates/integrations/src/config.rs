//! Collaborator configuration.

use serde::{Deserialize, Serialize};

use crate::http::MOCK_URL;

fn mock_url() -> String {
    MOCK_URL.to_string()
}

/// Document source API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSourceConfig {
    /// API base URL, or `mock` for an empty local source
    #[serde(default = "mock_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_document_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_document_timeout_secs() -> u64 {
    30
}

impl Default for DocumentSourceConfig {
    fn default() -> Self {
        Self {
            base_url: mock_url(),
            api_key: String::new(),
            timeout_secs: default_document_timeout_secs(),
        }
    }
}

/// Billing provider API and webhook verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// API base URL, or `mock` to treat every customer as paying
    #[serde(default = "mock_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Price billed once per subscribed region
    #[serde(default)]
    pub price_id: String,
    /// Shared secret for webhook signatures
    #[serde(default)]
    pub webhook_secret: String,
    /// Maximum accepted age of a webhook signature in seconds
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,
    #[serde(default = "default_billing_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_webhook_tolerance_secs() -> u64 {
    300
}

fn default_billing_timeout_secs() -> u64 {
    10
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            base_url: mock_url(),
            api_key: String::new(),
            price_id: String::new(),
            webhook_secret: String::new(),
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
            timeout_secs: default_billing_timeout_secs(),
        }
    }
}

/// Transactional mail API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// API base URL, or `mock` to log messages instead of sending
    #[serde(default = "mock_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    /// Receives alerts for permanently failed jobs
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default = "default_mail_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_from_email() -> String {
    "leads@localhost".to_string()
}

fn default_mail_timeout_secs() -> u64 {
    10
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            base_url: mock_url(),
            api_key: String::new(),
            from_email: default_from_email(),
            admin_email: None,
            timeout_secs: default_mail_timeout_secs(),
        }
    }
}
