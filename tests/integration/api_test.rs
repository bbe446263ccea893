//! Integration tests for the HTTP surface.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use serde_json::json;

use crate::helpers::TestApp;

#[tokio::test]
async fn test_health_reports_store() {
    let app = TestApp::new().await;

    let response = app.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["store"], "connected");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .get("/jobs/00000000-0000-0000-0000-999999999999?wait=5")
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_id_is_not_found() {
    let app = TestApp::new().await;

    let response = app.get("/jobs/not-a-job-id").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pending_job_without_wait() {
    let app = TestApp::new().await;
    let id = app.submit(json!({"task": "echo", "value": 42})).await;

    let response = app.get(&format!("/jobs/{id}")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], id.to_string());
    assert_eq!(response.body["status"], "PENDING");
    assert_eq!(response.body["jobType"], "echo");
    assert_eq!(response.body["payload"]["value"], 42);
    assert_eq!(response.body["attempts"], 0);
    assert_eq!(response.body["maxAttempts"], app.config.worker.max_attempts);
    assert!(response.body.get("result").is_none());
}

#[tokio::test]
async fn test_malformed_wait_reads_immediately() {
    let app = TestApp::new().await;
    let id = app.submit(json!({"task": "echo", "value": 1})).await;

    let started = Instant::now();
    let response = app.get(&format!("/jobs/{id}?wait=later")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "PENDING");
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_wait_on_unprocessed_job_times_out() {
    let app = TestApp::new().await;
    let id = app.submit(json!({"task": "echo", "value": 1})).await;

    let started = Instant::now();
    let response = app.get(&format!("/jobs/{id}?wait=1")).await;
    let elapsed = started.elapsed();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "PENDING");
    assert!(elapsed >= Duration::from_secs(1), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "returned late: {elapsed:?}");
}

#[tokio::test]
async fn test_wait_returns_completed_result() {
    let app = TestApp::with_worker().await;
    let id = app.submit(json!({"task": "echo", "value": 42})).await;

    let response = app.get(&format!("/jobs/{id}?wait=5")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "COMPLETED");
    assert_eq!(response.body["result"], 42);
    assert_eq!(response.body["attempts"], 1);
}

#[tokio::test]
async fn test_wait_ends_early_when_delayed_job_finishes() {
    let app = TestApp::with_worker().await;
    let id = app
        .submit(json!({"task": "delay", "delay_ms": 300, "value": "done"}))
        .await;

    let started = Instant::now();
    let response = app.get(&format!("/jobs/{id}?wait=10")).await;
    let elapsed = started.elapsed();

    assert_eq!(response.body["status"], "COMPLETED");
    assert_eq!(response.body["result"], "done");
    assert!(elapsed >= Duration::from_millis(300), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "returned late: {elapsed:?}");
}

#[tokio::test]
async fn test_permanent_failure_is_reported() {
    let app = TestApp::with_worker().await;
    let id = app.submit(json!({"task": "echo"})).await;

    let response = app.get(&format!("/jobs/{id}?wait=5")).await;

    assert_eq!(response.body["status"], "FAILED");
    assert_eq!(response.body["attempts"], 1);
    assert_eq!(response.body["error"]["kind"], "permanent");
    assert!(response.body.get("result").is_none());
}

#[tokio::test]
async fn test_queue_stats() {
    let app = TestApp::new().await;
    app.submit(json!({"task": "echo", "value": 1})).await;
    app.submit(json!({"task": "echo", "value": 2})).await;

    let response = app.get("/jobs/stats").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["pending"], 2);
    assert_eq!(response.body["processing"], 0);
    assert_eq!(response.body["total"], 2);
}
