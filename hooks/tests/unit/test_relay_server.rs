//! Download relay endpoint tests with a scripted fetcher

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tower::ServiceExt;

use catloader_hooks::app::options::AppOptions;
use catloader_hooks::app::state::AppState;
use catloader_hooks::errors::RelayError;
use catloader_hooks::models::progress::{DownloadRequest, ProgressEvent};
use catloader_hooks::relay::ytdlp::MediaFetcher;
use catloader_hooks::server::serve::relay_router;
use catloader_hooks::server::state::ServerState;

use crate::common::{body_json, ChannelExecutor, SECRET};

/// Emits the given progress and writes `output` unless it is `None`
struct ScriptedFetcher {
    percents: Vec<f64>,
    output: Option<&'static str>,
    failure: Option<&'static str>,
}

#[async_trait]
impl MediaFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        request: &DownloadRequest,
        workdir: &Path,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<(), RelayError> {
        for percent in &self.percents {
            let _ = progress
                .send(ProgressEvent::Downloading {
                    percent: *percent,
                    downloaded: None,
                    total: None,
                    speed: None,
                    eta: None,
                })
                .await;
        }
        if let Some(message) = self.failure {
            return Err(RelayError::DownloadFailed(message.to_string()));
        }
        if request.audio_only {
            let _ = progress.send(ProgressEvent::processing("Converting...")).await;
        }
        if let Some(name) = self.output {
            tokio::fs::write(workdir.join(name), b"fake media bytes").await?;
        }
        Ok(())
    }
}

fn router(fetcher: ScriptedFetcher) -> Router {
    let options = AppOptions::new(SecretString::from(SECRET));
    let (executor, _tasks) = ChannelExecutor::new();
    let app_state = AppState::with_backends(&options, executor, Arc::new(fetcher));
    relay_router(Arc::new(ServerState::new(options.secret.clone(), &app_state)))
}

async fn collect_events(router: &Router, query: &str) -> Vec<serde_json::Value> {
    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/download/progress?{}", query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(body.to_vec())
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

async fn fetch_file(router: &Router, download_id: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(
            Request::get(format!("/api/download/file/{}", download_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_progress_then_one_shot_file_retrieval() {
    let router = router(ScriptedFetcher {
        percents: vec![12.5, 60.0, 100.0],
        output: Some("Cat Video.mp4"),
        failure: None,
    });

    let events = collect_events(&router, "url=https%3A%2F%2Fexample.com%2Fwatch%3Fv%3D1").await;

    let statuses: Vec<&str> = events
        .iter()
        .map(|e| e["status"].as_str().unwrap())
        .filter(|s| *s != "waiting")
        .collect();
    assert_eq!(statuses, ["downloading", "downloading", "downloading", "complete"]);

    let complete = events.last().unwrap();
    assert_eq!(complete["filename"], "Cat Video.mp4");
    assert_eq!(complete["file_size"], 16);
    let download_id = complete["download_id"].as_str().unwrap().to_string();

    let response = fetch_file(&router, &download_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Cat Video.mp4\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"fake media bytes");

    let again = fetch_file(&router, &download_id).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audio_download_reports_processing_once() {
    let router = router(ScriptedFetcher {
        percents: vec![50.0, 100.0],
        output: Some("song.mp3"),
        failure: None,
    });

    let events = collect_events(
        &router,
        "url=https%3A%2F%2Fexample.com%2Fa&audio_only=true",
    )
    .await;

    let processing = events.iter().filter(|e| e["status"] == "processing").count();
    assert_eq!(processing, 1);
    assert_eq!(events.last().unwrap()["status"], "complete");
}

#[tokio::test]
async fn test_fetch_failure_ends_with_error_event() {
    let router = router(ScriptedFetcher {
        percents: vec![5.0],
        output: None,
        failure: Some("Video unavailable"),
    });

    let events = collect_events(&router, "url=https%3A%2F%2Fexample.com%2Fgone").await;

    assert_eq!(
        events.last().unwrap(),
        &serde_json::json!({"status": "error", "message": "Video unavailable"})
    );
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let router = router(ScriptedFetcher {
        percents: vec![],
        output: None,
        failure: None,
    });

    for query in ["url=ftp%3A%2F%2Fexample.com", "", "url=https%3A%2F%2Fa.b&format_id=best%3Brm"] {
        let response = router
            .clone()
            .oneshot(
                Request::get(format!("/api/download/progress?{}", query))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query: {query}");
        assert!(body_json(response).await["error"].is_string());
    }

    let response = fetch_file(&router, "not-a-valid-id").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = fetch_file(&router, &"A".repeat(43)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "Download not found"})
    );
}
