//! API routes.

pub mod health;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/billing", post(webhooks::billing_webhook_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
