//! Download relay handlers: SSE progress and one-shot file retrieval

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::errors::RelayError;
use crate::models::progress::DownloadRequest;
use crate::relay::validation::validate_download_id;
use crate::server::handlers::ErrorResponse;
use crate::server::state::ServerState;

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::DownloadFailed(_) | RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

/// Stream progress for one download as server-sent events
pub async fn progress_handler(
    State(state): State<Arc<ServerState>>,
    Query(request): Query<DownloadRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, RelayError> {
    let events = state.relay.start(request)?;
    Ok(Sse::new(
        events.map(|event| Event::default().json_data(event)),
    ))
}

/// Send a finished download once, then forget it
pub async fn file_handler(
    State(state): State<Arc<ServerState>>,
    Path(download_id): Path<String>,
) -> Result<Response, RelayError> {
    let download_id = validate_download_id(&download_id)?;
    let download = state.relay.store().take(download_id).ok_or_else(|| {
        warn!("Download requested but not available");
        RelayError::NotFound
    })?;

    let file = tokio::fs::File::open(&download.file_path)
        .await
        .map_err(|_| RelayError::NotFound)?;
    info!(
        "Serving download {} ({} bytes)",
        download.filename, download.file_size
    );

    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    let dir = download.dir;
    let stream = ReaderStream::new(file).map(move |chunk| {
        // The temporary directory lives until the body is done.
        let _dir = &dir;
        chunk
    });

    Ok((
        [
            (header::CONTENT_TYPE, download.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, download.file_size.to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
