//! Download progress relay
//!
//! Each SSE client owns one download task. The task fetches the media into a
//! private temporary directory, reports progress through a channel and, on
//! success, parks the artifact in the [`DownloadStore`] for one-shot retrieval.

pub mod store;
pub mod stream;
pub mod validation;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::errors::RelayError;
use crate::models::progress::{DownloadRequest, ProgressEvent};
use crate::relay::store::{CompletedDownload, DownloadStore};
use crate::relay::stream::{progress_stream, AbortOnDrop, StreamOptions};
use crate::relay::validation::{validate_format_id, validate_url};
use crate::relay::ytdlp::MediaFetcher;

const EVENT_BUFFER: usize = 64;

/// Prefix of every per-download scratch directory
pub const TEMP_DIR_PREFIX: &str = "catloader_";

/// Partial files yt-dlp may leave behind
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

pub struct ProgressRelay {
    fetcher: Arc<dyn MediaFetcher>,
    store: Arc<DownloadStore>,
    options: StreamOptions,
}

impl ProgressRelay {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        store: Arc<DownloadStore>,
        options: StreamOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            options,
        }
    }

    pub fn store(&self) -> &Arc<DownloadStore> {
        &self.store
    }

    /// Validate the request and start its download task.
    ///
    /// The returned stream owns the task; dropping it cancels the download.
    pub fn start(
        &self,
        request: DownloadRequest,
    ) -> Result<impl Stream<Item = ProgressEvent> + Send + 'static, RelayError> {
        let request = DownloadRequest {
            url: validate_url(&request.url)?,
            format_id: validate_format_id(&request.format_id)?,
            audio_only: request.audio_only,
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let fetcher = self.fetcher.clone();
        let store = self.store.clone();
        let task = tokio::spawn(async move {
            let event = match download(fetcher.as_ref(), &store, &request, tx.clone()).await {
                Ok(event) => event,
                Err(e) => {
                    error!("Download failed for {}: {}", request.url, e);
                    ProgressEvent::error(e.to_string())
                }
            };
            // A closed channel means the client is gone.
            let _ = tx.send(event).await;
        });

        Ok(progress_stream(
            rx,
            Some(AbortOnDrop(task)),
            self.options.clone(),
        ))
    }
}

async fn download(
    fetcher: &dyn MediaFetcher,
    store: &DownloadStore,
    request: &DownloadRequest,
    progress: mpsc::Sender<ProgressEvent>,
) -> Result<ProgressEvent, RelayError> {
    let dir = tempfile::Builder::new().prefix(TEMP_DIR_PREFIX).tempdir()?;

    fetcher.fetch(request, dir.path(), progress).await?;

    let file_path = find_artifact(dir.path())
        .await?
        .ok_or_else(|| RelayError::DownloadFailed("File not found".to_string()))?;
    let file_size = tokio::fs::metadata(&file_path).await?.len();
    let filename = sanitize_filename(&file_path, request.audio_only);
    let content_type = content_type_for(&file_path);

    info!("Download ready: {} ({} bytes)", filename, file_size);

    let download_id = store.insert(CompletedDownload::new(
        filename.clone(),
        file_size,
        content_type,
        file_path,
        dir,
    ));

    Ok(ProgressEvent::Complete {
        download_id,
        filename: Some(filename),
        file_size: Some(file_size),
    })
}

/// The finished output file inside a download directory, if any.
async fn find_artifact(dir: &Path) -> Result<Option<PathBuf>, RelayError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found: Option<(PathBuf, u64)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        // Keep the largest file when several remain.
        if found.as_ref().is_none_or(|(_, size)| metadata.len() > *size) {
            found = Some((entry.path(), metadata.len()));
        }
    }

    Ok(found.map(|(path, _)| path))
}

/// ASCII-only download name safe for a Content-Disposition header.
pub fn sanitize_filename(path: &Path, audio_only: bool) -> String {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| if audio_only { "mp3" } else { "mp4" }.to_string());

    let stem: String = path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || " -_.()[]".contains(*c))
        .collect();
    let stem = stem.trim().trim_matches('.');

    if stem.is_empty() {
        format!("download.{}", ext)
    } else {
        format!("{}.{}", stem, ext)
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "opus" => "audio/opus",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}
