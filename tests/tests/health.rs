//! Tests for health check endpoints.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::setup::TestContext;
use jobq::QueueName;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    for field in ["status", "database_connected", "queue_running", "queues", "metrics"] {
        assert!(body.get(field).is_some(), "Response should have '{field}' field");
    }

    let status = body["status"].as_str().unwrap_or("");
    assert!(
        status == "healthy" || status == "degraded" || status == "unhealthy",
        "unexpected status '{status}'"
    );
    assert_eq!(body["database_connected"], true);
}

/// Queue counts are reported per queue
#[tokio::test]
async fn test_health_reports_queue_counts() {
    let ctx = TestContext::new();
    ctx.runtime
        .enqueue(
            QueueName::DocumentIngest,
            &serde_json::json!({}),
            jobq::JobOpts::default(),
        )
        .await
        .unwrap();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let body: serde_json::Value = server.get("/health").await.json();
    let queues = &body["queues"];
    assert_eq!(queues["document-ingest"]["pending"], 1);
    assert_eq!(queues["lead-distribution"]["pending"], 0);
    assert!(queues.get("payment-reconcile").is_some());
}

/// Process counters ride along with the health report
#[tokio::test]
async fn test_health_reports_metrics() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    // Unsigned garbage still counts as received, then as rejected.
    server
        .post("/webhooks/billing")
        .add_header("billing-signature", "t=1,v1=00")
        .bytes(b"{}".to_vec().into())
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = server.get("/health").await.json();
    let metrics = &body["metrics"];
    assert!(metrics["webhooks_received"].as_u64().unwrap_or(0) >= 1);
    assert!(metrics["webhooks_rejected"].as_u64().unwrap_or(0) >= 1);
    for field in ["timestamp", "jobs_completed", "leads_distributed", "notifications_failed"] {
        assert!(metrics.get(field).is_some(), "metrics should have '{field}'");
    }
}

/// Test /health/live always returns 200
#[tokio::test]
async fn test_liveness_probe() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health/live").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

/// Test /health/ready once the queue runtime reports in
#[tokio::test]
async fn test_readiness_probe() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    telemetry::health().queue.set_healthy();
    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}
