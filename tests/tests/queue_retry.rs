//! Retry, exhaustion and recurring triggers through the real handlers.

use chrono::{Duration, Utc};
use integration_tests::mocks::SentMail;
use integration_tests::setup::TestContext;
use jobq::{JobOpts, JobStatus, QueueName};
use lead_store::Store;
use router_core::{DistributionStatus, LeadStatus};
use worker::{schedule_recurring, DistributionJob, ScheduleConfig, Schedules, SWEEP_TRIGGER};

async fn enqueue_distribute(ctx: &TestContext, lead_id: uuid::Uuid) -> uuid::Uuid {
    ctx.runtime
        .enqueue(
            QueueName::LeadDistribution,
            &DistributionJob::Distribute { lead_id },
            JobOpts::default(),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_billing_outage_is_retried_until_it_heals() {
    let ctx = TestContext::new();
    ctx.paid_customer("cus_a", &["10115"]).await;
    let lead = ctx.pending_lead("10115").await;
    ctx.billing.fail_checks_for("cus_a");
    let job_id = enqueue_distribute(&ctx, lead.id).await;

    let before = Utc::now();
    let ran = ctx.drain(QueueName::LeadDistribution).await;
    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].status, JobStatus::Pending);
    assert_eq!(ran[0].attempts, 1);
    assert!(ran[0].run_at >= before + Duration::seconds(5));
    assert!(ran[0].last_error.as_deref().unwrap().contains("HTTP 503"));
    assert_eq!(ctx.lead(lead.id).await.status, LeadStatus::Pending);

    ctx.billing.heal("cus_a");
    ctx.make_due(job_id, Utc::now()).await;
    let ran = ctx.drain(QueueName::LeadDistribution).await;

    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].status, JobStatus::Completed);
    assert_eq!(ran[0].attempts, 2);
    assert_eq!(ctx.lead(lead.id).await.status, LeadStatus::Distributed);
    assert_eq!(ctx.mailer.lead_payloads().len(), 1);
    assert!(ctx.mailer.alerts().is_empty());
}

#[tokio::test]
async fn test_failed_delivery_is_resent_on_retry() {
    let ctx = TestContext::new();
    let a = ctx.paid_customer("cus_a", &["10115"]).await;
    let lead = ctx.pending_lead("10115").await;
    ctx.mailer.fail_for(&a.email);
    let job_id = enqueue_distribute(&ctx, lead.id).await;

    let ran = ctx.drain(QueueName::LeadDistribution).await;
    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].status, JobStatus::Pending);
    assert_eq!(ran[0].attempts, 1);
    assert_eq!(ctx.lead(lead.id).await.status, LeadStatus::Pending);
    let rows = ctx.store.distributions_for_lead(lead.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DistributionStatus::Pending);
    assert!(ctx.mailer.lead_payloads().is_empty());

    ctx.mailer.heal(&a.email);
    ctx.make_due(job_id, Utc::now()).await;
    let ran = ctx.drain(QueueName::LeadDistribution).await;

    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].status, JobStatus::Completed);
    assert_eq!(ran[0].attempts, 2);
    let rows = ctx.store.distributions_for_lead(lead.id).await.unwrap();
    assert_eq!(rows.len(), 1, "the retry reuses the first row");
    assert_eq!(rows[0].status, DistributionStatus::Completed);
    assert!(rows[0].sent_at.is_some());
    assert_eq!(ctx.mailer.lead_payloads().len(), 1);
    assert_eq!(ctx.lead(lead.id).await.status, LeadStatus::Distributed);
}

#[tokio::test]
async fn test_exhausted_job_alerts_the_admin() {
    let ctx = TestContext::new();
    ctx.paid_customer("cus_a", &["10115"]).await;
    let lead = ctx.pending_lead("10115").await;
    ctx.billing.fail_checks_for("cus_a");
    let job_id = enqueue_distribute(&ctx, lead.id).await;

    let mut last = None;
    for attempt in 1..=3 {
        if attempt > 1 {
            ctx.make_due(job_id, Utc::now()).await;
        }
        let ran = ctx.drain(QueueName::LeadDistribution).await;
        assert_eq!(ran.len(), 1);
        assert_eq!(ran[0].attempts, attempt);
        last = ran.into_iter().next();
    }

    let last = last.unwrap();
    assert_eq!(last.status, JobStatus::Failed);
    assert!(last.finished_at.is_some());
    assert_eq!(ctx.billing.checks().len(), 3);

    let alerts = ctx.mailer.alerts();
    assert_eq!(alerts.len(), 1);
    let SentMail::ErrorAlert { to, subject, details } = &alerts[0] else {
        unreachable!()
    };
    assert_eq!(to, integration_tests::fixtures::ADMIN_EMAIL);
    assert!(subject.contains("exhausted"));
    assert!(details.contains("Attempts: 3"));
    assert!(details.contains(&format!("lead_id={}", lead.id)));

    // Nothing left to run.
    assert!(ctx.drain(QueueName::LeadDistribution).await.is_empty());
}

#[tokio::test]
async fn test_recurring_sweep_fires_once_per_slot() {
    let ctx = TestContext::new();
    let schedules = Schedules::try_from(&ScheduleConfig::default()).unwrap();
    schedule_recurring(&ctx.runtime, &schedules).await.unwrap();

    let trigger = ctx.queue.recurring(SWEEP_TRIGGER).expect("sweep trigger registered");
    assert_eq!(trigger.queue, QueueName::LeadDistribution);
    assert!(trigger.next_run_at > Utc::now());

    let later = Utc::now() + Duration::hours(2);
    let fired = ctx.runtime.fire_due_recurring(later).await.unwrap();
    // Sweep and ingestion are due within two hours; reconciliation only daily.
    assert!(fired >= 2);
    assert_eq!(ctx.runtime.fire_due_recurring(later).await.unwrap(), 0);

    let sweeps: Vec<_> = ctx
        .jobs(QueueName::LeadDistribution)
        .into_iter()
        .filter(|j| j.recurring_key.as_deref() == Some(SWEEP_TRIGGER))
        .collect();
    assert_eq!(sweeps.len(), 1, "missed slots collapse into one job");
    assert_eq!(sweeps[0].payload, serde_json::json!({ "type": "sweep_scheduled" }));

    // Fired for a slot two hours out; bring it forward to run it here.
    ctx.make_due(sweeps[0].id, Utc::now()).await;
    let ran = ctx.drain(QueueName::LeadDistribution).await;
    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].status, JobStatus::Completed);
    assert_eq!(ran[0].result.clone().unwrap()["due"], 0);
}

#[tokio::test]
async fn test_rescheduling_replaces_the_trigger() {
    let ctx = TestContext::new();
    let schedules = Schedules::try_from(&ScheduleConfig::default()).unwrap();
    schedule_recurring(&ctx.runtime, &schedules).await.unwrap();

    let hourly = ScheduleConfig {
        sweeper: "30 * * * *".into(),
        ..Default::default()
    };
    schedule_recurring(&ctx.runtime, &Schedules::try_from(&hourly).unwrap())
        .await
        .unwrap();

    let trigger = ctx.queue.recurring(SWEEP_TRIGGER).unwrap();
    assert_eq!(trigger.schedule.as_str(), "30 * * * *");
    assert!(ctx.queue.entries().is_empty(), "registering does not enqueue");
}
