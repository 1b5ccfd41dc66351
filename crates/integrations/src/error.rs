//! Collaborator call failures and how they map onto retry decisions.

use reqwest::StatusCode;
use router_core::{CollaboratorErrorCode, Error};

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl IntegrationError {
    /// Convert into the domain error. Timeouts and server-side failures are
    /// retryable; a 4xx other than 429 is a rejection retrying cannot fix.
    pub fn into_error(self, code: CollaboratorErrorCode, operation: &str, timeout_secs: u64) -> Error {
        let message = format!("{operation}: {self}");
        match &self {
            Self::Request(e) if e.is_timeout() => Error::timeout(operation, timeout_secs),
            Self::Status { status, .. }
                if status.is_client_error() && *status != StatusCode::TOO_MANY_REQUESTS =>
            {
                Error::collaborator_rejected(code, message)
            }
            _ => Error::collaborator(code, message),
        }
    }
}
