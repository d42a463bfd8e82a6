//! HTTP-level tests for the evaluate endpoints.
//!
//! The router runs against in-memory storage and a recording provisioning
//! backend; consumers are not started, so created instances stay pending
//! unless a test writes their detail.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use mlhub_core::memory::ManualClock;
use mlhub_core::ports::{EvaluateCreateRequest, EvaluateManager};
use mlhub_core::{Event, Result};
use mlhub_server::app::{App, ExternalServices};
use mlhub_server::config::Config;
use tokio::sync::watch;
use tower::ServiceExt;

const NOW: i64 = 1_700_000_000;
const BASE: &str = "/api/v1/evaluate/project/alice/p1/training/t1";

// ── Test app builder ───────────────────────────────────────────

#[derive(Default)]
struct RecordingManager {
    requests: Mutex<Vec<EvaluateCreateRequest>>,
}

#[async_trait]
impl EvaluateManager for RecordingManager {
    async fn create(&self, req: &EvaluateCreateRequest) -> Result<()> {
        self.requests.lock().unwrap().push(req.clone());
        Ok(())
    }
}

fn test_config() -> Config {
    let config = Config::from_yaml(
        r#"
evaluate:
  endpoint: http://backend.test/evaluate
  min_survival_time: 600
  survival_time: 3600
"#,
    )
    .unwrap();
    config.validate().unwrap();
    config
}

fn build_test_app() -> (App, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let mut external = ExternalServices::new(Arc::new(RecordingManager::default()));
    external.clock = Arc::new(ManualClock::new(NOW));
    (App::build(&test_config(), external, rx), tx)
}

async fn send(
    app: &App,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

// ── Tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let (app, _tx) = build_test_app();
    let (status, body) = send(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_custom_returns_pending_instance_and_emits_event() {
    let (app, _tx) = build_test_app();
    let mut events = app.broker.subscribe("evaluate").unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("{BASE}/custom"),
        Some(serde_json::json!({ "aim_path": "obs://bucket/aim" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let id = body["evaluate_id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert_eq!(body["access_url"], "");
    assert_eq!(body["error"], "");

    let event = Event::decode(&events.recv().await.unwrap()).unwrap();
    match event {
        Event::CreateEvaluate(info) => {
            assert_eq!(info.index.id, id);
            assert_eq!(info.obs_path, "obs://bucket/aim");
            assert_eq!(info.evaluate_type, "custom");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let (status, body) = send(&app, "GET", &format!("{BASE}/evaluate/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evaluate_id"], id.as_str());
}

#[tokio::test]
async fn empty_path_is_rejected_with_400() {
    let (app, _tx) = build_test_app();

    let (status, body) = send(
        &app,
        "POST",
        &format!("{BASE}/standard"),
        Some(serde_json::json!({ "log_path": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid cmd"));
}

#[tokio::test]
async fn unknown_instance_is_404() {
    let (app, _tx) = build_test_app();
    let (status, body) = send(&app, "GET", &format!("{BASE}/evaluate/missing"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn live_instance_is_reused_after_detail_update() {
    let (app, _tx) = build_test_app();
    let create = serde_json::json!({
        "log_path": "obs://bucket/log",
        "learning_rate_scope": [0.1, 0.01],
    });

    let (_, first) = send(&app, "POST", &format!("{BASE}/standard"), Some(create.clone())).await;
    let id = first["evaluate_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("{BASE}/evaluate/{id}/detail"),
        Some(serde_json::json!({
            "access_url": "https://eval.test/1",
            "expiry": NOW + 3_600,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, second) = send(&app, "POST", &format!("{BASE}/standard"), Some(create)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["evaluate_id"], id.as_str());
    assert_eq!(second["access_url"], "https://eval.test/1");
}

#[tokio::test]
async fn failed_instance_is_reported_to_new_callers() {
    let (app, _tx) = build_test_app();
    let create = serde_json::json!({ "aim_path": "obs://bucket/aim" });

    let (_, first) = send(&app, "POST", &format!("{BASE}/custom"), Some(create.clone())).await;
    let id = first["evaluate_id"].as_str().unwrap().to_string();

    send(
        &app,
        "PUT",
        &format!("{BASE}/evaluate/{id}/detail"),
        Some(serde_json::json!({ "error": "out of quota" })),
    )
    .await;

    let (status, second) = send(&app, "POST", &format!("{BASE}/custom"), Some(create)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["error"], "out of quota");
    assert_eq!(second["evaluate_id"], id.as_str());
}
