//! Webhook server tests driven through the router

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::json;
use secrecy::SecretString;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

use catloader_hooks::app::options::{AppOptions, ServerOptions};
use catloader_hooks::app::state::AppState;
use catloader_hooks::models::deployment::DeploymentTask;
use catloader_hooks::relay::ytdlp::YtDlp;
use catloader_hooks::server::serve::webhook_router;
use catloader_hooks::server::state::ServerState;
use catloader_hooks::webhook::dispatcher::RepoPaths;
use catloader_hooks::webhook::signature::{sign, SIGNATURE_HEADER};

use crate::common::{body_json, fake_checkout, ChannelExecutor, SECRET};

struct Harness {
    router: Router,
    tasks: mpsc::UnboundedReceiver<DeploymentTask>,
    _repos: TempDir,
}

fn harness_with(server: ServerOptions) -> Harness {
    let repos = tempfile::tempdir().unwrap();
    let mut options = AppOptions::new(SecretString::from(SECRET));
    options.repos = RepoPaths {
        production: fake_checkout(repos.path(), "prod"),
        development: fake_checkout(repos.path(), "dev"),
    };
    options.server = server.clone();

    let (executor, tasks) = ChannelExecutor::new();
    let app_state = AppState::with_backends(&options, executor, Arc::new(YtDlp::new("yt-dlp")));
    let state = Arc::new(ServerState::new(options.secret.clone(), &app_state));

    Harness {
        router: webhook_router(&server, state),
        tasks,
        _repos: repos,
    }
}

fn harness() -> Harness {
    harness_with(ServerOptions::default())
}

fn signed_push(payload: &serde_json::Value) -> Request<Body> {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign(&body, SECRET.as_bytes()).unwrap();
    Request::post("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body))
        .unwrap()
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn test_valid_main_push_is_accepted_and_deployed() {
    let mut harness = harness();
    let payload = json!({"ref": "refs/heads/main", "commits": [{"id": "a"}, {"id": "b"}]});

    let response = harness
        .router
        .clone()
        .oneshot(signed_push(&payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "accepted", "branch": "main", "commits": 2})
    );

    let task = tokio::time::timeout(Duration::from_secs(5), harness.tasks.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.branch, "main");
    assert!(task.repo_path.ends_with("prod"));
}

#[tokio::test]
async fn test_dev_push_targets_development_checkout() {
    let mut harness = harness();
    let payload = json!({"ref": "refs/heads/dev", "commits": []});

    let response = harness
        .router
        .clone()
        .oneshot(signed_push(&payload))
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await,
        json!({"status": "accepted", "branch": "dev", "commits": 0})
    );

    let task = tokio::time::timeout(Duration::from_secs(5), harness.tasks.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(task.repo_path.ends_with("dev"));
}

#[tokio::test]
async fn test_bad_signature_is_rejected_without_deploying() {
    let mut harness = harness();
    let body = serde_json::to_vec(&json!({"ref": "refs/heads/main"})).unwrap();

    let cases = [
        None,
        Some("sha256=deadbeef".to_string()),
        Some(sign(&body, b"some-other-secret-that-is-long-enough").unwrap()),
        sign(&body, SECRET.as_bytes()).map(|s| s.trim_start_matches("sha256=").to_string()),
    ];

    for signature in cases {
        let mut request = Request::post("/webhook");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let response = harness
            .router
            .clone()
            .oneshot(request.body(Body::from(body.clone())).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid signature"})
        );
    }

    assert!(harness.tasks.try_recv().is_err());
    let (_, metrics) = get_json(&harness.router, "/metrics").await;
    assert_eq!(metrics["totalDeployments"], 0);
}

#[tokio::test]
async fn test_unconfigured_branch_and_non_push_are_ignored() {
    let harness = harness();

    let response = harness
        .router
        .clone()
        .oneshot(signed_push(&json!({"ref": "refs/heads/feature-x", "commits": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ignored");

    let response = harness
        .router
        .clone()
        .oneshot(signed_push(&json!({"zen": "Keep it logically awesome."})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ignored");

    let (_, metrics) = get_json(&harness.router, "/metrics").await;
    assert_eq!(metrics["totalDeployments"], 0);
    assert_eq!(metrics["successRate"], "N/A");
}

#[tokio::test]
async fn test_malformed_json_returns_error_result() {
    let harness = harness();
    let body = b"{not json".to_vec();
    let signature = sign(&body, SECRET.as_bytes()).unwrap();

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::post("/webhook")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "error");
}

#[tokio::test]
async fn test_unknown_routes_and_methods_are_not_found() {
    let harness = harness();

    let (status, body) = get_json(&harness.router, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Not found"}));

    let (status, body) = get_json(&harness.router, "/webhook").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Not found"}));

    let response = harness
        .router
        .clone()
        .oneshot(Request::post("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_queues() {
    let harness = harness();

    let (status, body) = get_json(&harness.router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    assert!(body["timestamp"].as_str().is_some());
    assert_eq!(body["queues"]["prod"], json!({"running": false, "queueDepth": 0}));
    assert_eq!(body["queues"]["dev"], json!({"running": false, "queueDepth": 0}));
}

#[tokio::test]
async fn test_every_request_is_counted() {
    let harness = harness();

    get_json(&harness.router, "/health").await;
    get_json(&harness.router, "/missing").await;
    let (_, metrics) = get_json(&harness.router, "/metrics").await;

    assert_eq!(metrics["totalRequests"], 3);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_and_connection_closed() {
    let harness = harness_with(ServerOptions {
        max_body_size: 64,
        ..Default::default()
    });
    let body = vec![b'x'; 1024];
    let signature = sign(&body, SECRET.as_bytes()).unwrap();

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::post("/webhook")
                .header(SIGNATURE_HEADER, signature)
                .header(header::CONTENT_LENGTH, body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()[header::CONNECTION], "close");
}

#[tokio::test]
async fn test_stalled_body_times_out_and_connection_closed() {
    let harness = harness_with(ServerOptions {
        request_timeout: Duration::from_millis(100),
        ..Default::default()
    });
    let stalled = futures::stream::pending::<Result<Bytes, std::io::Error>>();

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::post("/webhook")
                .body(Body::from_stream(stalled))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(response.headers()[header::CONNECTION], "close");
}
