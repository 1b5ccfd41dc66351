//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jobq::QueueCounts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use telemetry::MetricsSnapshot;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database_connected: bool,
    pub queue_running: bool,
    /// Absent when the counts could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queues: Option<BTreeMap<String, QueueCounts>>,
    pub metrics: MetricsSnapshot,
}

/// Acknowledgement returned to the billing provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "INVALID_SIGNATURE", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<router_core::Error> for ApiError {
    fn from(err: router_core::Error) -> Self {
        use router_core::Error;

        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match &err {
            Error::Unauthorized(msg) => ApiError::unauthorized(msg.clone()),
            Error::InvalidPayload(msg) => ApiError::bad_request(msg.clone()),
            _ => {
                let code = err.error_code().unwrap_or("INTERNAL");
                ApiError::with_code(status, code, err.to_string())
            }
        }
    }
}
