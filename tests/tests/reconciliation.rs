//! Daily payment reconciliation.

use integration_tests::setup::TestContext;
use jobq::{JobStatus, QueueName};
use lead_store::Store;
use router_core::{CustomerStatus, LeadStatus};
use worker::{DistributionOutcome, ReconcileSummary};

#[tokio::test]
async fn test_inactive_customers_are_demoted() {
    let ctx = TestContext::new();
    let a = ctx.paid_customer("cus_a", &["10115"]).await;
    let b = ctx.paid_customer("cus_b", &["80331"]).await;
    ctx.billing.set_inactive("cus_b");

    let summary = ctx.services.reconciler().run().await.unwrap();
    assert_eq!(
        summary,
        ReconcileSummary {
            checked: 2,
            updated: 1
        }
    );
    assert_eq!(ctx.customer(a.id).await.status, CustomerStatus::Paid);
    assert_eq!(ctx.customer(b.id).await.status, CustomerStatus::Unpaid);

    // A demoted customer no longer receives leads for their region.
    let lead = ctx.pending_lead("80331").await;
    let outcome = ctx
        .services
        .engine()
        .process_new_lead(&lead, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, DistributionOutcome::Unassigned);
    assert_eq!(ctx.lead(lead.id).await.status, LeadStatus::Unassigned);
}

#[tokio::test]
async fn test_unpaid_customers_are_not_checked() {
    let ctx = TestContext::new();
    let a = ctx.paid_customer("cus_a", &["10115"]).await;
    ctx.store
        .set_customer_status(a.id, CustomerStatus::Unpaid)
        .await
        .unwrap();

    let summary = ctx.services.reconciler().run().await.unwrap();
    assert_eq!(summary, ReconcileSummary::default());
    assert!(ctx.billing.checks().is_empty());
}

#[tokio::test]
async fn test_billing_outage_fails_the_run() {
    let ctx = TestContext::new();
    ctx.paid_customer("cus_a", &["10115"]).await;
    ctx.billing.fail_checks_for("cus_a");

    ctx.runtime
        .enqueue(QueueName::PaymentReconcile, &serde_json::json!({}), jobq::JobOpts::default())
        .await
        .unwrap();
    let ran = ctx.drain(QueueName::PaymentReconcile).await;

    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].status, JobStatus::Pending);
    assert!(ran[0].run_at > chrono::Utc::now());
}
