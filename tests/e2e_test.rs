//! End-to-end tests against a running classifier service.
//!
//! These tests require:
//! 1. PostgreSQL and Redis running
//! 2. The API server with its worker pool running (`catalog-classifier`)
//! 3. The vision model service reachable (or a stand-in on MODEL_SERVICE_URL)
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override the default (http://localhost:8080)

use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

fn base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    pending_jobs: i64,
    processing_jobs: i64,
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_health_check() {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/health", base_url()))
        .send()
        .await
        .expect("health check request failed");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("invalid health body");
    assert_eq!(body["service"], "classifier");
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_submit_and_poll_classification() {
    let client = reqwest::Client::new();
    let product_id = Uuid::new_v4();
    let image_url = format!("https://cdn.example.com/e2e-{}.jpg", Uuid::new_v4());

    // Submit
    let response = client
        .post(format!("{}/api/v1/classify", base_url()))
        .json(&serde_json::json!({
            "product_id": product_id,
            "image_url": image_url,
            "priority": 5,
        }))
        .send()
        .await
        .expect("submit request failed");
    assert_eq!(response.status().as_u16(), 202);

    let submitted: SubmitResponse = response.json().await.expect("invalid submit body");
    assert_eq!(submitted.status, "queued");
    assert!(!submitted.job_id.is_empty());

    // Poll for the result; the worker should pick the job up within its
    // 100 ms idle cadence plus one model round trip.
    let mut found = false;
    for _ in 0..30 {
        sleep(Duration::from_secs(1)).await;
        let response = client
            .get(format!("{}/api/v1/classify/product/{product_id}", base_url()))
            .send()
            .await
            .expect("poll request failed");
        if response.status().is_success() {
            let body: serde_json::Value = response.json().await.expect("invalid result body");
            let status = body["status"].as_str().unwrap_or_default();
            assert!(
                status == "completed" || status == "review",
                "unexpected terminal status: {status}"
            );
            found = true;
            break;
        }
    }
    assert!(found, "classification result never appeared");
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_batch_validation_rejects_oversize() {
    let client = reqwest::Client::new();
    let items: Vec<_> = (0..1001)
        .map(|_| {
            serde_json::json!({
                "product_id": Uuid::new_v4(),
                "image_url": "https://cdn.example.com/x.jpg",
            })
        })
        .collect();

    let response = client
        .post(format!("{}/api/v1/classify/batch", base_url()))
        .json(&serde_json::json!({ "items": items }))
        .send()
        .await
        .expect("batch request failed");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_stats_shape() {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/stats", base_url()))
        .send()
        .await
        .expect("stats request failed");
    assert!(response.status().is_success());

    let stats: StatsResponse = response.json().await.expect("invalid stats body");
    assert!(stats.pending_jobs >= 0);
    assert!(stats.processing_jobs >= 0);
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_review_queue_contains_only_review_status() {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/v1/review?limit=20", base_url()))
        .send()
        .await
        .expect("review request failed");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("invalid review body");
    for entry in body["data"].as_array().expect("data must be an array") {
        assert_eq!(entry["status"], "review");
        assert_eq!(entry["needs_review"], true);
    }
}
