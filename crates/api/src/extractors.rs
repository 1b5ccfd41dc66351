//! Request extractors.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use integrations::SIGNATURE_HEADER;

use crate::response::ApiError;

/// Raw billing signature header.
#[derive(Debug, Clone)]
pub struct BillingSignature(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BillingSignature
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(SIGNATURE_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(|s| BillingSignature(s.to_string()))
            .ok_or_else(|| ApiError::unauthorized(format!("missing {SIGNATURE_HEADER} header")))
    }
}
