//! Request middleware for the webhook server

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::server::handlers::ErrorResponse;
use crate::telemetry::Metrics;

/// Count every request once, on arrival.
pub async fn count_requests(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    metrics.record_request();
    next.run(request).await
}

/// Give aborted requests a JSON body and close their connection.
pub async fn close_on_abort(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let message = match response.status() {
        StatusCode::PAYLOAD_TOO_LARGE => "Payload too large",
        StatusCode::REQUEST_TIMEOUT => "Request timeout",
        _ => return response,
    };

    let mut response = (response.status(), Json(ErrorResponse::new(message))).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
