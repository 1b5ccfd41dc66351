//! Document source: where inbound lead documents come from.

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use router_core::{CollaboratorErrorCode, Error, RegionCode, Result};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::config::DocumentSourceConfig;
use crate::error::IntegrationError;
use crate::http::{base_url, build_client, expect_success, is_mock};

/// Five-digit postal code standing on its own.
static POSTAL_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{5})\b").unwrap_or_else(|e| panic!("invalid postal code pattern: {e}"))
});

/// A document not yet processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    #[serde(default, alias = "url", alias = "locationRef")]
    pub location: Option<String>,
}

/// Region code found in a document plus whatever was learned on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRegion {
    pub region_code: RegionCode,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait DocumentSource: Send + Sync + 'static {
    async fn list_new_documents(&self) -> Result<Vec<DocumentRef>>;

    async fn download_document(&self, id: &str) -> Result<Bytes>;

    /// Fails with a terminal error when the content holds no region code.
    async fn extract_region_code(&self, content: &[u8]) -> Result<ExtractedRegion>;

    async fn mark_document_processed(&self, id: &str) -> Result<()>;
}

/// Scan text for the first standalone five-digit code.
///
/// Works on the raw bytes read as lossy UTF-8, so codes inside compressed
/// PDF streams are not found.
pub fn extract_postal_code(content: &[u8]) -> Result<ExtractedRegion> {
    let text = String::from_utf8_lossy(content);
    let mut matches = POSTAL_CODE.captures_iter(&text).filter_map(|c| c.get(1));
    let first = matches
        .next()
        .ok_or_else(|| Error::invalid_payload("no postal code found in document"))?;
    let others = matches.count();

    Ok(ExtractedRegion {
        region_code: RegionCode::new(first.as_str())?,
        metadata: serde_json::json!({
            "size_bytes": content.len(),
            "offset": first.start(),
            "other_candidates": others,
        }),
    })
}

/// HTTP client for the document source API.
///
/// A `mock` base URL yields an empty source.
pub struct HttpDocumentSource {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: String,
    timeout_secs: u64,
}

impl HttpDocumentSource {
    pub fn new(config: &DocumentSourceConfig) -> Result<Self> {
        let base = if is_mock(&config.base_url) {
            None
        } else {
            Some(base_url(&config.base_url)?)
        };
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: base,
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn map(&self, operation: &'static str) -> impl Fn(IntegrationError) -> Error + '_ {
        move |e| e.into_error(CollaboratorErrorCode::DocumentSource, operation, self.timeout_secs)
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn list_new_documents(&self) -> Result<Vec<DocumentRef>> {
        let Some(base) = &self.base_url else {
            debug!("Document source in mock mode, nothing to fetch");
            return Ok(Vec::new());
        };
        let err = self.map("list_new_documents");

        let resp = self
            .client
            .get(format!("{base}/documents/new"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| err(e.into()))?;
        let resp = expect_success(resp).await.map_err(&err)?;
        resp.json::<Vec<DocumentRef>>().await.map_err(|e| err(e.into()))
    }

    async fn download_document(&self, id: &str) -> Result<Bytes> {
        let Some(base) = &self.base_url else {
            return Err(Error::config("document source is not configured"));
        };
        let err = self.map("download_document");

        let resp = self
            .client
            .get(format!("{base}/documents/{id}/download"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| err(e.into()))?;
        let resp = expect_success(resp).await.map_err(&err)?;
        resp.bytes().await.map_err(|e| err(e.into()))
    }

    async fn extract_region_code(&self, content: &[u8]) -> Result<ExtractedRegion> {
        extract_postal_code(content)
    }

    async fn mark_document_processed(&self, id: &str) -> Result<()> {
        let Some(base) = &self.base_url else {
            return Ok(());
        };
        let err = self.map("mark_document_processed");

        let resp = self
            .client
            .post(format!("{base}/documents/{id}/mark-processed"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| err(e.into()))?;
        expect_success(resp).await.map_err(&err)?;
        info!(document_id = %id, "Marked document processed");
        Ok(())
    }
}
