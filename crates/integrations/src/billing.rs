//! Billing provider: customers, subscriptions and payment state.

use async_trait::async_trait;
use chrono::Utc;
use router_core::{CollaboratorErrorCode, Error, RegionCode, Result};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::IntegrationError;
use crate::http::{base_url, build_client, expect_success, is_mock};
use crate::webhook::{parse_event, verify_signature, BillingEvent};

/// Live payment state of a billing customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentStatus {
    pub is_active: bool,
}

#[async_trait]
pub trait BillingProvider: Send + Sync + 'static {
    /// Returns the provider's customer id.
    async fn create_customer(&self, email: &str, name: &str) -> Result<String>;

    async fn create_subscriptions_for_regions(
        &self,
        billing_id: &str,
        regions: &[RegionCode],
    ) -> Result<()>;

    async fn check_payment_status(&self, billing_id: &str) -> Result<PaymentStatus>;

    /// Verify a webhook signature and decode the event it carries.
    fn decode_webhook(&self, payload: &[u8], signature: &str) -> Result<BillingEvent>;
}

#[derive(Deserialize)]
struct CustomerObject {
    id: String,
}

#[derive(Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// HTTP client for the billing API.
///
/// A `mock` base URL makes every customer look paid and accepts every
/// create call.
pub struct HttpBillingProvider {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: String,
    price_id: String,
    webhook_secret: String,
    webhook_tolerance_secs: u64,
    timeout_secs: u64,
}

impl HttpBillingProvider {
    pub fn new(config: &BillingConfig) -> Result<Self> {
        let base = if is_mock(&config.base_url) {
            None
        } else {
            Some(base_url(&config.base_url)?)
        };
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: base,
            api_key: config.api_key.clone(),
            price_id: config.price_id.clone(),
            webhook_secret: config.webhook_secret.clone(),
            webhook_tolerance_secs: config.webhook_tolerance_secs,
            timeout_secs: config.timeout_secs,
        })
    }

    fn map(&self, operation: &'static str) -> impl Fn(IntegrationError) -> Error + '_ {
        move |e| e.into_error(CollaboratorErrorCode::Billing, operation, self.timeout_secs)
    }
}

#[async_trait]
impl BillingProvider for HttpBillingProvider {
    async fn create_customer(&self, email: &str, name: &str) -> Result<String> {
        let Some(base) = &self.base_url else {
            let id = format!("cus_mock_{}", Uuid::new_v4().simple());
            debug!(billing_id = %id, "Billing in mock mode, created local customer id");
            return Ok(id);
        };
        let err = self.map("create_customer");

        let resp = self
            .client
            .post(format!("{base}/v1/customers"))
            .bearer_auth(&self.api_key)
            .form(&[("email", email), ("name", name)])
            .send()
            .await
            .map_err(|e| err(e.into()))?;
        let resp = expect_success(resp).await.map_err(&err)?;
        let customer: CustomerObject = resp.json().await.map_err(|e| err(e.into()))?;

        info!(billing_id = %customer.id, "Created billing customer");
        Ok(customer.id)
    }

    async fn create_subscriptions_for_regions(
        &self,
        billing_id: &str,
        regions: &[RegionCode],
    ) -> Result<()> {
        let Some(base) = &self.base_url else {
            return Ok(());
        };
        if regions.is_empty() {
            return Ok(());
        }
        let err = self.map("create_subscriptions_for_regions");

        let quantity = regions.len().to_string();
        let region_list = regions
            .iter()
            .map(RegionCode::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let resp = self
            .client
            .post(format!("{base}/v1/subscriptions"))
            .bearer_auth(&self.api_key)
            .form(&[
                ("customer", billing_id),
                ("items[0][price]", self.price_id.as_str()),
                ("items[0][quantity]", quantity.as_str()),
                ("metadata[regions]", region_list.as_str()),
            ])
            .send()
            .await
            .map_err(|e| err(e.into()))?;
        expect_success(resp).await.map_err(&err)?;

        info!(billing_id = %billing_id, regions = regions.len(), "Created billing subscription");
        Ok(())
    }

    async fn check_payment_status(&self, billing_id: &str) -> Result<PaymentStatus> {
        let Some(base) = &self.base_url else {
            return Ok(PaymentStatus { is_active: true });
        };
        let err = self.map("check_payment_status");

        let resp = self
            .client
            .get(format!("{base}/v1/subscriptions"))
            .bearer_auth(&self.api_key)
            .query(&[("customer", billing_id), ("status", "active")])
            .send()
            .await
            .map_err(|e| err(e.into()))?;
        let resp = expect_success(resp).await.map_err(&err)?;
        let list: SubscriptionList = resp.json().await.map_err(|e| err(e.into()))?;

        Ok(PaymentStatus {
            is_active: !list.data.is_empty(),
        })
    }

    fn decode_webhook(&self, payload: &[u8], signature: &str) -> Result<BillingEvent> {
        verify_signature(
            payload,
            signature,
            &self.webhook_secret,
            self.webhook_tolerance_secs,
            Utc::now(),
        )?;
        Ok(parse_event(payload)?)
    }
}
