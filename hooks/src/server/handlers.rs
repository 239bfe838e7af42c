//! HTTP request handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{SecondsFormat, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{info, warn};

use crate::deploy::queue::QueueStatus;
use crate::server::state::ServerState;
use crate::webhook::signature::{verify_signature, SIGNATURE_HEADER};

/// Error body used by every non-2xx response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: f64,
    pub timestamp: String,
    pub queues: BTreeMap<&'static str, QueueStatus>,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let queues = state
        .queue
        .snapshot()
        .into_iter()
        .map(|(env, status)| (env.as_str(), status))
        .collect();

    Json(HealthResponse {
        status: "healthy",
        uptime: state.metrics.uptime_secs(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        queues,
    })
}

/// Metrics handler
pub async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Webhook handler: authenticate, then hand the push event to the dispatcher
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let secret = state.secret.expose_secret().as_bytes();
    if !verify_signature(&body, signature, secret) {
        warn!("Rejected webhook: invalid signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid signature")),
        )
            .into_response();
    }
    info!("Webhook signature verified ({} bytes)", body.len());

    (StatusCode::OK, Json(state.dispatcher.handle(&body))).into_response()
}

/// Fallback for unknown paths and unsupported methods
pub async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found")))
}
