//! Shared HTTP plumbing for the collaborator clients.

use router_core::{Error, Result};
use std::time::Duration;
use url::Url;

use crate::error::IntegrationError;

/// Base URL value that switches a client into mock mode.
pub const MOCK_URL: &str = "mock";

pub(crate) fn is_mock(base_url: &str) -> bool {
    base_url.is_empty() || base_url == MOCK_URL
}

/// Build a client whose every request is bounded by `timeout_secs`.
pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}

/// Validate a base URL and strip the trailing slash.
pub(crate) fn base_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw).map_err(|e| Error::config(format!("invalid base url '{raw}': {e}")))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Turn a non-2xx response into [`IntegrationError::Status`].
pub(crate) async fn expect_success(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IntegrationError::Status { status, body })
}
