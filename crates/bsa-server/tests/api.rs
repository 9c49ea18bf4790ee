//! End-to-end API tests over an ephemeral port
//!
//! Cycles are driven directly through the reconciler instead of waiting out
//! the timer, so these tests never sleep.

use bsa_core::CoreConfig;
use bsa_server::Service;
use serde_json::json;

async fn spawn_server(service: &Service) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = service.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_propose_then_state_reflects_commit() {
    let service = Service::new(CoreConfig::default());
    let base = spawn_server(&service).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/v1/propose", base))
        .json(&json!({
            "intent_id": "a",
            "delta_patch": "set x = 1",
            "provisional": false,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let ack: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(ack["status"], "accepted");
    assert_eq!(ack["intent_id"], "a");

    service.reconciler.run_cycle();

    let resp = client
        .get(format!("{}/api/v1/state", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["x"], 1);
    assert_eq!(body["version"], "v1");
}

#[tokio::test]
async fn test_state_before_first_commit_is_bootstrap() {
    let service = Service::new(CoreConfig::default());
    let base = spawn_server(&service).await;

    let body: serde_json::Value = reqwest::get(format!("{}/api/v1/state", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"], json!({}));
    assert_eq!(body["version"], json!(null));
}

#[tokio::test]
async fn test_historical_and_unknown_versions() {
    let service = Service::new(CoreConfig::default());
    let base = spawn_server(&service).await;
    let client = reqwest::Client::new();

    for (id, patch) in [("a", "set x = 1"), ("b", "set x = 2")] {
        client
            .post(format!("{}/api/v1/propose", base))
            .json(&json!({ "intent_id": id, "delta_patch": patch }))
            .send()
            .await
            .unwrap();
        service.reconciler.run_cycle();
    }

    let old: serde_json::Value = client
        .get(format!("{}/api/v1/state?version=v1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(old["data"]["x"], 1);

    let latest: serde_json::Value = client
        .get(format!("{}/api/v1/state?version=latest", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(latest["data"]["x"], 2);
    assert_eq!(latest["version"], "v2");

    let missing = client
        .get(format!("{}/api/v1/state?version=v99", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let invalid = client
        .get(format!("{}/api/v1/state?version=abc", base))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
async fn test_propose_validation_errors() {
    let service = Service::new(CoreConfig::default());
    let base = spawn_server(&service).await;
    let client = reqwest::Client::new();

    let missing_intent = client
        .post(format!("{}/api/v1/propose", base))
        .json(&json!({ "intent_id": "", "delta_patch": "set x = 1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_intent.status(), 400);

    let missing_patch = client
        .post(format!("{}/api/v1/propose", base))
        .json(&json!({ "intent_id": "a", "delta_patch": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_patch.status(), 400);

    let bad_patch = client
        .post(format!("{}/api/v1/propose", base))
        .json(&json!({ "intent_id": "a", "delta_patch": "frobnicate x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_patch.status(), 400);
    let body: serde_json::Value = bad_patch.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn test_duplicate_intent_conflicts_until_drained() {
    let service = Service::new(CoreConfig::default());
    let base = spawn_server(&service).await;
    let client = reqwest::Client::new();

    let proposal = json!({ "intent_id": "a", "delta_patch": "set x = 1" });
    let first = client
        .post(format!("{}/api/v1/propose", base))
        .json(&proposal)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 202);

    let duplicate = client
        .post(format!("{}/api/v1/propose", base))
        .json(&proposal)
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    service.reconciler.run_cycle();

    let retry = client
        .post(format!("{}/api/v1/propose", base))
        .json(&proposal)
        .send()
        .await
        .unwrap();
    assert_eq!(retry.status(), 202);
}

#[tokio::test]
async fn test_health_reports_ok() {
    let service = Service::new(CoreConfig::default());
    let base = spawn_server(&service).await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
