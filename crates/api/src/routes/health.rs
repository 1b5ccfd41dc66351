//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use telemetry::{health, metrics};
use tracing::warn;

use crate::response::HealthResponse;
use crate::state::AppState;

async fn probe_database(state: &AppState) {
    match state.store.ping().await {
        Ok(()) => health().database.set_healthy(),
        Err(e) => {
            warn!(error = %e, "Database ping failed");
            health().database.set_unhealthy(e.to_string());
        }
    }
}

/// GET /health - Full health check.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    probe_database(&state).await;
    let report = health().report();

    let queues = match state.queue_counts().await {
        Ok(counts) => Some(counts),
        Err(e) => {
            warn!(error = %e, "Failed to read queue counts");
            None
        }
    };

    Json(HealthResponse {
        status: format!("{:?}", report.status).to_lowercase(),
        database_connected: health().database.is_healthy(),
        queue_running: health().queue.is_healthy(),
        queues,
        metrics: metrics().snapshot(),
    })
}

/// GET /health/ready - Readiness probe (can accept traffic).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    probe_database(&state).await;
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
