//! HTTP server setup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::HookError;
use crate::server::downloads::{file_handler, progress_handler};
use crate::server::handlers::{
    health_handler, metrics_handler, not_found_handler, webhook_handler,
};
use crate::server::middleware::{close_on_abort, count_requests};
use crate::server::state::ServerState;

/// Build the webhook router: health, metrics and the signed push endpoint
pub fn webhook_router(options: &ServerOptions, state: Arc<ServerState>) -> Router {
    let metrics = state.metrics.clone();

    Router::new()
        // Known paths answer 404 for any other method
        .route("/health", get(health_handler).fallback(not_found_handler))
        .route("/metrics", get(metrics_handler).fallback(not_found_handler))
        .route("/webhook", post(webhook_handler).fallback(not_found_handler))
        .fallback(not_found_handler)
        .with_state(state)
        // Innermost first
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(options.max_body_size))
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(middleware::from_fn(close_on_abort))
        .layer(middleware::from_fn_with_state(metrics, count_requests))
        .layer(TraceLayer::new_for_http())
}

/// Build the download relay router
pub fn relay_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/download/progress", get(progress_handler))
        .route("/api/download/file/{download_id}", get(file_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the webhook server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), HookError>>, HookError> {
    let app = webhook_router(options, state);
    spawn_server("webhook", &options.host, options.port, app, shutdown_signal).await
}

/// Start the download relay server
pub async fn serve_relay(
    host: &str,
    port: u16,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), HookError>>, HookError> {
    spawn_server("relay", host, port, relay_router(state), shutdown_signal).await
}

async fn spawn_server(
    name: &'static str,
    host: &str,
    port: u16,
    app: Router,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), HookError>>, HookError> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| HookError::ServerError(format!("failed to bind {}: {}", addr, e)))?;

    let local_addr: SocketAddr = listener
        .local_addr()
        .map_err(|e| HookError::ServerError(e.to_string()))?;
    info!("Starting {} server on {}", name, local_addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| HookError::ServerError(e.to_string()))
    });

    Ok(handle)
}
