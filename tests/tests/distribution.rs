//! Distribution engine scenarios, driven directly and through the queue.

use chrono::{Duration, Utc};
use integration_tests::mocks::SentMail;
use integration_tests::setup::TestContext;
use jobq::{JobOpts, JobStatus, QueueName};
use lead_store::Store;
use router_core::{DistributionStatus, Error, LeadStatus};
use worker::{DistributionJob, DistributionOutcome};

#[tokio::test]
async fn test_single_subscriber_gets_lead_immediately() {
    let ctx = TestContext::new();
    let a = ctx.paid_customer("cus_a", &["10115"]).await;
    let lead = ctx.pending_lead("10115").await;
    let now = Utc::now();

    let outcome = ctx.services.engine().process_new_lead(&lead, now).await.unwrap();

    let distributions = ctx.store.distributions_for_lead(lead.id).await.unwrap();
    assert_eq!(distributions.len(), 1);
    let d = &distributions[0];
    assert_eq!(d.customer_id, a.id);
    assert_eq!(d.scheduled_for, now);
    assert_eq!(d.status, DistributionStatus::Completed);
    assert_eq!(d.sent_at, Some(now));
    assert_eq!(
        outcome,
        DistributionOutcome::Distributed {
            customer_id: a.id,
            distribution_id: d.id
        }
    );

    let stored = ctx.lead(lead.id).await;
    assert_eq!(stored.status, LeadStatus::Distributed);
    assert_eq!(stored.processed_at, Some(now));

    assert_eq!(
        ctx.mailer.lead_payloads(),
        vec![SentMail::LeadPayload {
            to: a.email.clone(),
            region: "10115".into(),
            bytes: lead.payload.len(),
        }]
    );
    assert_eq!(ctx.billing.checks(), vec!["cus_a"]);
}

#[tokio::test]
async fn test_contended_region_defers_by_three_days() {
    let ctx = TestContext::new();
    let b = ctx.paid_customer("cus_b", &["80331"]).await;
    let c = ctx.paid_customer("cus_c", &["80331"]).await;
    let lead = ctx.pending_lead("80331").await;
    let now = Utc::now();

    let outcome = ctx.services.engine().process_new_lead(&lead, now).await.unwrap();
    assert_eq!(
        outcome,
        DistributionOutcome::Scheduled {
            distributions: 2,
            scheduled_for: now + Duration::days(3)
        }
    );

    let distributions = ctx.store.distributions_for_lead(lead.id).await.unwrap();
    assert_eq!(distributions.len(), 2);
    for d in &distributions {
        assert_eq!(d.scheduled_for, now + Duration::days(3));
        assert_eq!(d.status, DistributionStatus::Pending);
        assert!(d.sent_at.is_none());
    }
    let mut recipients: Vec<_> = distributions.iter().map(|d| d.customer_id).collect();
    recipients.sort();
    let mut expected = vec![b.id, c.id];
    expected.sort();
    assert_eq!(recipients, expected);

    let stored = ctx.lead(lead.id).await;
    assert_eq!(stored.status, LeadStatus::Scheduled);
    assert_eq!(stored.processed_at, Some(now));

    let notices = ctx.mailer.delayed_notices();
    assert_eq!(notices.len(), 2);
    assert!(notices
        .iter()
        .all(|m| matches!(m, SentMail::DelayedNotice { days: 3, region, .. } if region == "80331")));
    assert!(ctx.mailer.lead_payloads().is_empty(), "payload waits for the sweeper");
    assert!(ctx.billing.checks().is_empty(), "no live check on the delayed path");
}

#[tokio::test]
async fn test_no_subscriber_leaves_lead_unassigned() {
    let ctx = TestContext::new();
    ctx.paid_customer("cus_other", &["80331"]).await;
    let lead = ctx.pending_lead("10115").await;
    let now = Utc::now();

    let outcome = ctx.services.engine().process_new_lead(&lead, now).await.unwrap();
    assert_eq!(outcome, DistributionOutcome::Unassigned);

    let stored = ctx.lead(lead.id).await;
    assert_eq!(stored.status, LeadStatus::Unassigned);
    assert_eq!(stored.processed_at, Some(now));
    assert!(ctx.store.distributions().is_empty());
    assert!(ctx.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_unpaid_and_cancelled_subscribers_are_not_eligible() {
    let ctx = TestContext::new();
    let a = ctx.paid_customer("cus_a", &["10115"]).await;
    let b = ctx.paid_customer("cus_b", &["10115"]).await;
    ctx.store
        .set_customer_status(a.id, router_core::CustomerStatus::Unpaid)
        .await
        .unwrap();
    ctx.store.cancel_subscriptions(b.id, Utc::now()).await.unwrap();

    let lead = ctx.pending_lead("10115").await;
    let outcome = ctx.services.engine().process_new_lead(&lead, Utc::now()).await.unwrap();
    assert_eq!(outcome, DistributionOutcome::Unassigned);
}

#[tokio::test]
async fn test_failed_live_check_demotes_and_strands_lead() {
    let ctx = TestContext::new();
    let a = ctx.paid_customer("cus_a", &["10115"]).await;
    ctx.billing.set_inactive("cus_a");
    let lead = ctx.pending_lead("10115").await;

    let outcome = ctx.services.engine().process_new_lead(&lead, Utc::now()).await.unwrap();
    assert_eq!(outcome, DistributionOutcome::Stranded { customer_id: a.id });

    assert_eq!(ctx.customer(a.id).await.status, router_core::CustomerStatus::Unpaid);
    let stored = ctx.lead(lead.id).await;
    assert_eq!(stored.status, LeadStatus::Pending);
    assert!(stored.processed_at.is_none());
    assert!(ctx.store.distributions().is_empty());
    assert!(ctx.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_reprocessing_delayed_lead_does_not_double_notices() {
    let ctx = TestContext::new();
    ctx.paid_customer("cus_b", &["80331"]).await;
    ctx.paid_customer("cus_c", &["80331"]).await;
    ctx.paid_customer("cus_d", &["80331"]).await;
    let lead = ctx.pending_lead("80331").await;
    let engine = ctx.services.engine();

    let first = Utc::now();
    engine.process_new_lead(&lead, first).await.unwrap();
    // Same lead handed in again, as a retry would after a late failure.
    engine
        .process_new_lead(&lead, first + Duration::seconds(30))
        .await
        .unwrap();

    let distributions = ctx.store.distributions_for_lead(lead.id).await.unwrap();
    assert_eq!(distributions.len(), 3);
    assert!(distributions
        .iter()
        .all(|d| d.scheduled_for == first + Duration::days(3)));
    assert_eq!(ctx.mailer.delayed_notices().len(), 3);
}

#[tokio::test]
async fn test_failed_notice_is_retried_with_the_job() {
    let ctx = TestContext::new();
    let b = ctx.paid_customer("cus_b", &["80331"]).await;
    let c = ctx.paid_customer("cus_c", &["80331"]).await;
    ctx.mailer.fail_for(&b.email);
    let lead = ctx.pending_lead("80331").await;
    let engine = ctx.services.engine();

    let first = Utc::now();
    let err = engine.process_new_lead(&lead, first).await.unwrap_err();
    assert!(err.is_retryable());

    // C was told and has a row; B has neither and the lead waits.
    let rows = ctx.store.distributions_for_lead(lead.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].customer_id, c.id);
    assert_eq!(ctx.mailer.delayed_notices().len(), 1);
    assert_eq!(ctx.lead(lead.id).await.status, LeadStatus::Pending);

    ctx.mailer.heal(&b.email);
    let outcome = engine
        .process_new_lead(&lead, first + Duration::seconds(30))
        .await
        .unwrap();
    assert!(matches!(outcome, DistributionOutcome::Scheduled { distributions: 2, .. }));

    let rows = ctx.store.distributions_for_lead(lead.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|d| d.scheduled_for == first + Duration::days(3)));
    let mut told: Vec<_> = ctx
        .mailer
        .delayed_notices()
        .iter()
        .map(|m| m.recipient().to_string())
        .collect();
    told.sort();
    assert_eq!(told, vec![b.email, c.email]);
    assert_eq!(ctx.lead(lead.id).await.status, LeadStatus::Scheduled);
}

#[tokio::test]
async fn test_distribution_job_records_outcome() {
    let ctx = TestContext::new();
    ctx.paid_customer("cus_a", &["10115"]).await;
    let lead = ctx.pending_lead("10115").await;

    ctx.runtime
        .enqueue(
            QueueName::LeadDistribution,
            &DistributionJob::Distribute { lead_id: lead.id },
            JobOpts::default(),
        )
        .await
        .unwrap();
    let ran = ctx.drain(QueueName::LeadDistribution).await;

    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].status, JobStatus::Completed);
    let result = ran[0].result.clone().unwrap();
    assert_eq!(result["outcome"], "distributed");
    assert_eq!(result["lead_id"], lead.id.to_string());
}

#[tokio::test]
async fn test_missing_lead_fails_job_without_retry() {
    let ctx = TestContext::new();
    let lead_id = uuid::Uuid::new_v4();

    ctx.runtime
        .enqueue(
            QueueName::LeadDistribution,
            &DistributionJob::Distribute { lead_id },
            JobOpts::default(),
        )
        .await
        .unwrap();
    let ran = ctx.drain(QueueName::LeadDistribution).await;

    assert_eq!(ran.len(), 1, "integrity errors are not retried");
    assert_eq!(ran[0].status, JobStatus::Failed);
    assert_eq!(ran[0].attempts, 1);
    assert_eq!(
        ran[0].last_error.as_deref(),
        Some(Error::LeadNotFound(lead_id).to_string().as_str())
    );

    let alerts = ctx.mailer.alerts();
    assert_eq!(alerts.len(), 1);
    let SentMail::ErrorAlert { subject, details, .. } = &alerts[0] else {
        unreachable!()
    };
    assert!(subject.contains("terminal"));
    assert!(details.contains(&format!("Entity: lead_id={lead_id}")));
}

#[tokio::test]
async fn test_already_processed_lead_is_terminal() {
    let ctx = TestContext::new();
    let lead = ctx.pending_lead("10115").await;
    ctx.services.engine().process_new_lead(&lead, Utc::now()).await.unwrap();

    let err = ctx.services.engine().process_lead_by_id(lead.id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::LeadNotPending {
            status: LeadStatus::Unassigned,
            ..
        }
    ));
    assert!(!err.is_retryable());
}
