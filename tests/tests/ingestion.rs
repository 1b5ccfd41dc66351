//! Document ingestion into leads and distribution jobs.

use integration_tests::fixtures::{document_without_code, lead_document};
use integration_tests::setup::TestContext;
use jobq::{JobStatus, QueueName};
use router_core::LeadStatus;
use worker::{DistributionJob, IngestionSummary};

#[tokio::test]
async fn test_documents_become_leads_with_distribution_jobs() {
    let ctx = TestContext::new();
    ctx.documents.add_document("doc-1", lead_document("10115"));
    ctx.documents.add_document("doc-2", lead_document("80331"));

    let summary = ctx.services.ingestion(ctx.runtime.clone()).run().await.unwrap();
    assert_eq!(
        summary,
        IngestionSummary {
            processed: 2,
            skipped: 0
        }
    );

    let mut leads = ctx.store.leads();
    leads.sort_by(|a, b| a.source_ref.cmp(&b.source_ref));
    assert_eq!(leads.len(), 2);
    assert_eq!(leads[0].source_ref, "doc-1");
    assert_eq!(leads[0].region_code.as_str(), "10115");
    assert_eq!(
        leads[0].source_url.as_deref(),
        Some("https://documents.example.com/doc-1.pdf")
    );
    assert_eq!(leads[0].payload, lead_document("10115"));
    assert!(leads.iter().all(|l| l.status == LeadStatus::Pending));

    let jobs = ctx.jobs(QueueName::LeadDistribution);
    assert_eq!(jobs.len(), 2);
    for lead in &leads {
        let expected = serde_json::to_value(DistributionJob::Distribute { lead_id: lead.id }).unwrap();
        assert!(jobs.iter().any(|j| j.payload == expected));
    }
    assert!(jobs.iter().all(|j| j.max_attempts == 3));

    assert_eq!(ctx.documents.processed(), vec!["doc-1", "doc-2"]);
}

#[tokio::test]
async fn test_document_without_code_is_skipped() {
    let ctx = TestContext::new();
    ctx.documents.add_document("doc-blank", document_without_code());
    ctx.documents.add_document("doc-ok", lead_document("10115"));

    let summary = ctx.services.ingestion(ctx.runtime.clone()).run().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);

    assert_eq!(ctx.store.leads().len(), 1);
    assert_eq!(ctx.documents.processed(), vec!["doc-blank", "doc-ok"]);

    // Marked off upstream, so the next run does not fetch it again.
    let again = ctx.services.ingestion(ctx.runtime.clone()).run().await.unwrap();
    assert_eq!(again, IngestionSummary::default());
    assert_eq!(ctx.store.leads().len(), 1);
}

#[tokio::test]
async fn test_skipped_document_mark_failure_is_retried() {
    let ctx = TestContext::new();
    ctx.documents.add_document("doc-blank", document_without_code());
    ctx.documents.set_mark_failure(true);

    let err = ctx
        .services
        .ingestion(ctx.runtime.clone())
        .run()
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(ctx.documents.processed().is_empty());

    ctx.documents.set_mark_failure(false);
    let summary = ctx.services.ingestion(ctx.runtime.clone()).run().await.unwrap();
    assert_eq!(
        summary,
        IngestionSummary {
            processed: 0,
            skipped: 1
        }
    );
    assert_eq!(ctx.documents.processed(), vec!["doc-blank"]);
    assert!(ctx.store.leads().is_empty());
}

#[tokio::test]
async fn test_no_documents_is_a_quiet_run() {
    let ctx = TestContext::new();
    let summary = ctx.services.ingestion(ctx.runtime.clone()).run().await.unwrap();
    assert_eq!(summary, IngestionSummary::default());
    assert!(ctx.queue.entries().is_empty());
}

#[tokio::test]
async fn test_mark_failure_retries_the_ingestion_job() {
    let ctx = TestContext::new();
    ctx.documents.add_document("doc-1", lead_document("10115"));
    ctx.documents.set_mark_failure(true);

    ctx.runtime
        .enqueue(QueueName::DocumentIngest, &serde_json::json!({}), jobq::JobOpts::default())
        .await
        .unwrap();
    let ran = ctx.drain(QueueName::DocumentIngest).await;

    assert_eq!(ran.len(), 1, "retry waits out its backoff");
    assert_eq!(ran[0].status, JobStatus::Pending);
    assert_eq!(ran[0].attempts, 1);
    assert!(ran[0].last_error.as_deref().unwrap().contains("connection reset"));

    // The lead and its job were written before the mark failed.
    assert_eq!(ctx.store.leads().len(), 1);
    assert_eq!(ctx.jobs(QueueName::LeadDistribution).len(), 1);
    assert!(ctx.documents.processed().is_empty());
}

#[tokio::test]
async fn test_ingested_lead_is_distributed_end_to_end() {
    let ctx = TestContext::new();
    let a = ctx.paid_customer("cus_a", &["10115"]).await;
    ctx.documents.add_document("doc-1", lead_document("10115"));

    ctx.runtime
        .enqueue(QueueName::DocumentIngest, &serde_json::json!({}), jobq::JobOpts::default())
        .await
        .unwrap();
    let ingest = ctx.drain(QueueName::DocumentIngest).await;
    assert_eq!(ingest[0].status, JobStatus::Completed);
    assert_eq!(ingest[0].result.clone().unwrap()["processed"], 1);

    let distribute = ctx.drain(QueueName::LeadDistribution).await;
    assert_eq!(distribute.len(), 1);
    assert_eq!(distribute[0].status, JobStatus::Completed);

    let lead = &ctx.store.leads()[0];
    assert_eq!(lead.status, LeadStatus::Distributed);
    let payloads = ctx.mailer.lead_payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].recipient(), a.email);
}
