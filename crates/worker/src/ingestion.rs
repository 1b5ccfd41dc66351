//! Pulls new documents from the document source and turns them into leads.

use chrono::Utc;
use integrations::{DocumentRef, DocumentSource};
use jobq::{JobOpts, QueueName, QueueRuntime};
use lead_store::Store;
use router_core::{Error, NewLead, Result};
use serde::Serialize;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{info, warn};
use uuid::Uuid;

use crate::jobs::{distribution_job_opts, DistributionJob};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub processed: usize,
    /// Documents that can never become a lead (no region code, rejected
    /// download). They are marked processed so they are not fetched again.
    pub skipped: usize,
}

pub struct IngestionJob {
    store: Arc<dyn Store>,
    source: Arc<dyn DocumentSource>,
    runtime: Arc<QueueRuntime>,
    distribution_opts: JobOpts,
}

impl IngestionJob {
    pub fn new(store: Arc<dyn Store>, source: Arc<dyn DocumentSource>, runtime: Arc<QueueRuntime>) -> Self {
        Self {
            store,
            source,
            runtime,
            distribution_opts: distribution_job_opts(),
        }
    }

    /// Ingest every new document.
    ///
    /// A document is marked processed only after its lead is stored and the
    /// distribution job is enqueued. Any retryable failure fails the run; a
    /// retry may then store a second lead for a document handled before the
    /// failure point.
    pub async fn run(&self) -> Result<IngestionSummary> {
        let documents = self.source.list_new_documents().await?;
        let mut summary = IngestionSummary::default();
        if documents.is_empty() {
            return Ok(summary);
        }
        info!(documents = documents.len(), "Ingesting new documents");

        for doc in &documents {
            match self.ingest(doc).await {
                Ok(lead_id) => {
                    summary.processed += 1;
                    info!(document_id = %doc.id, lead_id = %lead_id, "Document ingested");
                }
                Err(e) if !e.is_retryable() => {
                    warn!(document_id = %doc.id, error = %e, "Document skipped");
                    self.source.mark_document_processed(&doc.id).await?;
                    summary.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    async fn ingest(&self, doc: &DocumentRef) -> Result<Uuid> {
        let content = self.source.download_document(&doc.id).await?;
        let extracted = self.source.extract_region_code(&content).await?;

        let lead = self
            .store
            .insert_lead(
                NewLead {
                    region_code: extracted.region_code,
                    source_ref: doc.id.clone(),
                    source_url: doc.location.clone(),
                    payload: content,
                },
                Utc::now(),
            )
            .await?;
        metrics().leads_ingested.inc();

        self.runtime
            .enqueue(
                QueueName::LeadDistribution,
                &DistributionJob::Distribute { lead_id: lead.id },
                self.distribution_opts.clone(),
            )
            .await
            .map_err(|e| Error::internal(format!("failed to enqueue lead {}: {e}", lead.id)))?;

        self.source.mark_document_processed(&doc.id).await?;
        Ok(lead.id)
    }
}
