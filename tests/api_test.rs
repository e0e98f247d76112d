use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;
use tower::ServiceExt; // for `oneshot`

use zonelog::api::{AppState, router};
use zonelog::config::Config;
use zonelog::ingest::Ingestor;
use zonelog::ledger::{LedgerStore, SweepPhase};
use zonelog::observability::Metrics;

/// Creates a config the way an operator would write it
fn create_test_config() -> Config {
    let config_toml = r#"
ident = "zonelog-test"

[store]
path = "/tmp/unused"

[retention]
retention = "1h"
    "#;

    toml::from_str(config_toml).expect("Failed to parse test config")
}

struct TestApp {
    router: Router,
    ingestor: Ingestor,
    _temp_dir: TempDir,
}

/// Builds a router over an isolated store
fn build_test_app() -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config();

    let store = LedgerStore::open_with(temp_dir.path().join("ledger"), config.store_options())
        .expect("Failed to open test store");
    let metrics = Arc::new(Metrics::new());
    let (_phase_tx, phase_rx) = watch::channel(SweepPhase::Idle);

    let state = AppState::new(
        config.ident.as_str(),
        store.clone(),
        metrics.clone(),
        phase_rx,
    );

    TestApp {
        router: router(state),
        ingestor: Ingestor::new(store, metrics),
        _temp_dir: temp_dir,
    }
}

impl TestApp {
    fn ingest(&self, event: Value) {
        let payload = rmp_serde::to_vec_named(&event).unwrap();
        let source: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        self.ingestor.receive(&payload, source);
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.get(uri).await;
        (status, serde_json::from_str(&body).unwrap())
    }
}

#[tokio::test]
async fn test_get_returns_entries_for_id() {
    let app = build_test_app();
    app.ingest(json!({"id": "Q1", "action": "QUEUED", "message-id": "<abc@x>", "size": 10}));
    app.ingest(json!({"id": "Q1", "action": "DELIVERED"}));

    let (status, body) = app.get_json("/get/Q1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "Q1");

    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "QUEUED");
    assert_eq!(entries[0]["message-id"], "<abc@x>");
    assert_eq!(entries[0]["size"], 10);
    assert!(entries[0]["timestamp"].is_string());
    assert_eq!(entries[1]["action"], "DELIVERED");
}

#[tokio::test]
async fn test_get_unknown_id_is_404() {
    let app = build_test_app();

    let (status, body) = app.get_json("/get/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_get_with_seq_filter() {
    let app = build_test_app();
    app.ingest(json!({"id": "Q1", "seq": "1", "n": 1}));
    app.ingest(json!({"id": "Q1", "seq": "2", "n": 2}));
    app.ingest(json!({"id": "Q1", "n": 3}));

    let (status, body) = app.get_json("/get/Q1.2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "Q1");

    let ns: Vec<_> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, vec![2, 3]);
}

#[tokio::test]
async fn test_find_by_message_id() {
    let app = build_test_app();
    app.ingest(json!({"id": "Q1", "action": "QUEUED", "message-id": "<abc@x>"}));

    let (status, body) = app.get_json("/find?messageId=%3CABC%40X%3E").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "messageId": "<ABC@X>",
            "entries": [{"entryId": "Q1", "messageId": "<abc@x>"}]
        })
    );
}

#[tokio::test]
async fn test_find_requires_message_id() {
    let app = build_test_app();

    let (status, body) = app.get_json("/find").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_QUERY");

    let (status, _) = app.get_json("/find?messageId=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_find_without_matches_is_404() {
    let app = build_test_app();
    app.ingest(json!({"id": "Q1", "action": "QUEUED", "message-id": "<abc@x>"}));

    let (status, _) = app.get_json("/find?messageId=nothing@here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_keys_streams_every_key_with_trailer() {
    let app = build_test_app();
    app.ingest(json!({"id": "Q1", "action": "QUEUED", "message-id": "<abc@x>"}));

    let (status, body) = app.get("/keys").await;
    assert_eq!(status, StatusCode::OK);

    let lines: Vec<_> = body.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("by-entry Q1 "));
    assert!(lines[1].starts_with("by-message fwd abc@x "));
    assert!(lines[2].starts_with("by-message rev x@cba "));
    assert!(lines[3].starts_with("ledger "));
    assert!(lines[5].starts_with("Listed 5 keys in "));
    assert!(lines[5].ends_with("s."));
}

#[tokio::test]
async fn test_stats_is_plain_text() {
    let app = build_test_app();
    app.ingest(json!({"id": "Q1"}));

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("zonelog-test"));
    assert!(text.contains("entries_stored: 1"));
    assert!(text.contains("phase: idle"));
}

#[tokio::test]
async fn test_responses_are_gzipped_on_request() {
    let app = build_test_app();
    for i in 0..50 {
        app.ingest(json!({"id": "Q1", "n": i, "padding": "x".repeat(64)}));
    }

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/get/Q1")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_app();

    let (status, body) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["ledger"], "healthy");
    assert_eq!(body["components"]["retention"], "idle");
}

#[tokio::test]
async fn test_health_reports_closing_store() {
    let app = build_test_app();
    app.ingestor.store().shutdown_token().cancel();

    let (status, body) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["components"]["ledger"], "closing");
}

#[tokio::test]
async fn test_queries_during_shutdown_are_503() {
    let app = build_test_app();
    app.ingest(json!({"id": "Q1"}));
    app.ingestor.store().shutdown_token().cancel();

    let (status, body) = app.get_json("/get/Q1").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "UNAVAILABLE");
}
