//! Billing provider webhooks.

use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::extractors::BillingSignature;
use crate::response::{ApiError, WebhookAck};
use crate::state::AppState;

/// POST /webhooks/billing - Signed billing events.
///
/// The raw body is verified before it is parsed. Unknown event types are
/// acknowledged so the provider stops redelivering them.
pub async fn billing_webhook_handler(
    State(state): State<AppState>,
    BillingSignature(signature): BillingSignature,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    metrics().webhooks_received.inc();

    let event = state
        .accounts
        .billing()
        .decode_webhook(&body, &signature)
        .map_err(|e| {
            metrics().webhooks_rejected.inc();
            warn!(error = %e, "Rejected billing webhook");
            ApiError::from(e)
        })?;
    debug!(event = ?event, "Billing webhook verified");

    state.accounts.apply_billing_event(&event, Utc::now()).await?;
    Ok(Json(WebhookAck { received: true }))
}
