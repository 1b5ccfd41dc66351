//! Billing webhook endpoint and customer onboarding.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::fixtures::{billing_event, signature_for};
use integration_tests::mocks::SentMail;
use integration_tests::setup::TestContext;
use lead_store::Store;
use router_core::{CustomerStatus, SubscriptionStatus};

fn server(ctx: &TestContext) -> TestServer {
    TestServer::new(ctx.router.clone()).expect("Failed to create test server")
}

#[tokio::test]
async fn test_payment_succeeded_marks_customer_paid() {
    let ctx = TestContext::new();
    let customer = ctx
        .accounts
        .register_customer("new@example.com", "New Customer", &["10115".into()])
        .await
        .unwrap();
    assert_eq!(customer.status, CustomerStatus::Unpaid);
    let server = server(&ctx);

    let body = billing_event("invoice.payment_succeeded", &customer.billing_id);
    let response = server
        .post("/webhooks/billing")
        .add_header("billing-signature", &signature_for(&body))
        .bytes(body.into())
        .await;

    response.assert_status_ok();
    let ack: serde_json::Value = response.json();
    assert_eq!(ack["received"], true);

    let stored = ctx.customer(customer.id).await;
    assert_eq!(stored.status, CustomerStatus::Paid);
    assert!(stored.last_payment_at.is_some());
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let ctx = TestContext::new();
    let customer = ctx.paid_customer("cus_a", &["10115"]).await;
    let server = server(&ctx);

    let body = billing_event("invoice.payment_failed", "cus_a");
    let signature = signature_for(b"some other body");
    let response = server
        .post("/webhooks/billing")
        .add_header("billing-signature", &signature)
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let error: serde_json::Value = response.json();
    assert_eq!(error["code"], "INVALID_SIGNATURE");
    assert_eq!(ctx.customer(customer.id).await.status, CustomerStatus::Paid);
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let ctx = TestContext::new();
    let server = server(&ctx);

    let response = server
        .post("/webhooks/billing")
        .bytes(billing_event("invoice.payment_succeeded", "cus_a").into())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payment_failed_demotes_and_notifies() {
    let ctx = TestContext::new();
    let customer = ctx.paid_customer("cus_a", &["10115"]).await;
    let server = server(&ctx);

    let body = billing_event("invoice.payment_failed", "cus_a");
    server
        .post("/webhooks/billing")
        .add_header("billing-signature", &signature_for(&body))
        .bytes(body.into())
        .await
        .assert_status_ok();

    assert_eq!(ctx.customer(customer.id).await.status, CustomerStatus::Unpaid);
    let notices: Vec<_> = ctx
        .mailer
        .sent()
        .into_iter()
        .filter(|m| matches!(m, SentMail::PaymentFailure { .. }))
        .collect();
    assert_eq!(
        notices,
        vec![SentMail::PaymentFailure {
            to: customer.email.clone(),
            name: customer.name.clone(),
        }]
    );
}

#[tokio::test]
async fn test_subscription_deleted_cancels_subscriptions() {
    let ctx = TestContext::new();
    let customer = ctx.paid_customer("cus_a", &["10115", "80331"]).await;
    let server = server(&ctx);

    let body = billing_event("customer.subscription.deleted", "cus_a");
    server
        .post("/webhooks/billing")
        .add_header("billing-signature", &signature_for(&body))
        .bytes(body.into())
        .await
        .assert_status_ok();

    let subscriptions = ctx.store.list_subscriptions(customer.id).await.unwrap();
    assert_eq!(subscriptions.len(), 2);
    assert!(subscriptions
        .iter()
        .all(|s| s.status == SubscriptionStatus::Cancelled && s.ended_at.is_some()));
}

#[tokio::test]
async fn test_unhandled_and_unknown_events_are_acknowledged() {
    let ctx = TestContext::new();
    let server = server(&ctx);

    for body in [
        billing_event("charge.refunded", "cus_a"),
        billing_event("invoice.payment_succeeded", "cus_nobody"),
    ] {
        server
            .post("/webhooks/billing")
            .add_header("billing-signature", &signature_for(&body))
            .bytes(body.into())
            .await
            .assert_status_ok();
    }
    assert!(ctx.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_register_customer_collapses_duplicate_regions() {
    let ctx = TestContext::new();

    let customer = ctx
        .accounts
        .register_customer(
            "dup@example.com",
            "Dup",
            &["10115".into(), "80331".into(), "10115".into()],
        )
        .await
        .unwrap();

    assert_eq!(customer.billing_id, "cus_1");
    let subscriptions = ctx.store.list_subscriptions(customer.id).await.unwrap();
    assert_eq!(subscriptions.len(), 2);
    assert_eq!(
        ctx.billing.created_subscriptions(),
        vec![("cus_1".to_string(), vec!["10115".to_string(), "80331".to_string()])]
    );
}

#[tokio::test]
async fn test_register_customer_rejects_bad_regions() {
    let ctx = TestContext::new();

    assert!(ctx
        .accounts
        .register_customer("x@example.com", "X", &["10-115".into()])
        .await
        .is_err());
    assert!(ctx
        .accounts
        .register_customer("x@example.com", "X", &[])
        .await
        .is_err());
    assert!(ctx.billing.created_customers().is_empty());
}
