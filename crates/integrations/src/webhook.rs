//! Billing webhook signatures and event decoding.
//!
//! The signature header has the form `t=<unix secs>,v1=<hex hmac>`; the MAC is
//! HMAC-SHA256 over `"{t}.{body}"` keyed with the shared webhook secret. More
//! than one `v1` entry may be present during secret rotation.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use router_core::Error;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "billing-signature";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    NoSecret,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no matching signature")]
    Mismatch,
    #[error("invalid event body: {0}")]
    InvalidBody(String),
}

impl From<WebhookError> for Error {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::InvalidBody(_) => Error::invalid_payload(e.to_string()),
            _ => Error::unauthorized(e.to_string()),
        }
    }
}

/// Typed billing events the router reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    PaymentSucceeded { customer: String },
    PaymentFailed { customer: String },
    SubscriptionCancelled { customer: String },
    /// Acknowledged and otherwise ignored.
    Ignored { event_type: String },
}

impl BillingEvent {
    pub fn customer(&self) -> Option<&str> {
        match self {
            Self::PaymentSucceeded { customer }
            | Self::PaymentFailed { customer }
            | Self::SubscriptionCancelled { customer } => Some(customer),
            Self::Ignored { .. } => None,
        }
    }
}

fn mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::NoSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Produce a signature header for `payload`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, WebhookError> {
    let sig = hex::encode(mac(secret, timestamp, payload)?.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={sig}"))
}

/// Check a signature header against `payload`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: DateTime<Utc>,
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::NoSecret);
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => {
                timestamp = Some(v.parse::<i64>().map_err(|_| WebhookError::MalformedHeader)?)
            }
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    if now.timestamp().abs_diff(timestamp) > tolerance_secs {
        return Err(WebhookError::Expired);
    }

    let expected = mac(secret, timestamp, payload)?;
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| expected.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(WebhookError::Mismatch)
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    customer: Option<String>,
}

/// Decode a verified event body.
pub fn parse_event(payload: &[u8]) -> Result<BillingEvent, WebhookError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidBody(e.to_string()))?;

    let customer = || {
        raw.data
            .object
            .customer
            .clone()
            .ok_or_else(|| WebhookError::InvalidBody("event has no customer".into()))
    };

    Ok(match raw.event_type.as_str() {
        "invoice.payment_succeeded" => BillingEvent::PaymentSucceeded { customer: customer()? },
        "invoice.payment_failed" => BillingEvent::PaymentFailed { customer: customer()? },
        "customer.subscription.deleted" => {
            BillingEvent::SubscriptionCancelled { customer: customer()? }
        }
        other => BillingEvent::Ignored {
            event_type: other.to_string(),
        },
    })
}
