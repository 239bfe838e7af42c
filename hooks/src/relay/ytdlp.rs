//! yt-dlp backed media fetcher

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::RelayError;
use crate::models::progress::{DownloadRequest, ProgressEvent};

/// Prefix of the machine-readable progress lines requested from yt-dlp
const PROGRESS_MARKER: &str = "[relay]";

const PROGRESS_TEMPLATE: &str = "download:[relay] %(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s";

/// Post-processor tags printed by yt-dlp once the transfer is done
const POSTPROCESSORS: &[&str] = &[
    "[ExtractAudio]",
    "[Merger]",
    "[VideoConvertor]",
    "[VideoRemuxer]",
    "[FixupM3u8]",
    "[FixupM4a]",
    "[FixupStretched]",
    "[EmbedThumbnail]",
    "[Metadata]",
];

/// Downloads one media item into a directory, reporting progress
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &DownloadRequest,
        workdir: &Path,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<(), RelayError>;
}

/// Fetcher that shells out to the yt-dlp binary
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    socket_timeout_secs: u64,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket_timeout_secs: 30,
        }
    }

    fn args(&self, request: &DownloadRequest, workdir: &Path) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "-o".to_string(),
            workdir.join("%(title)s.%(ext)s").display().to_string(),
        ];

        if request.audio_only {
            args.extend(
                ["-f", "bestaudio/best", "-x", "--audio-format", "mp3"]
                    .into_iter()
                    .map(String::from),
            );
        } else {
            args.push("-f".to_string());
            args.push(request.format_id.clone());
        }

        args.push("--".to_string());
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch(
        &self,
        request: &DownloadRequest,
        workdir: &Path,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<(), RelayError> {
        info!("Starting yt-dlp download for {}", request.url);

        let mut child = Command::new(&self.binary)
            .args(self.args(request, workdir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::DownloadFailed(format!("yt-dlp is not available: {}", e)))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut last_error = None;
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("yt-dlp: {}", line);
                    if let Some(message) = line.strip_prefix("ERROR:") {
                        last_error = Some(message.trim().to_string());
                    }
                }
                last_error
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(event) = parse_progress_line(&line) {
                    if progress.send(event).await.is_err() {
                        // Nobody is listening any more.
                        warn!("Progress receiver dropped, stopping yt-dlp");
                        return Err(RelayError::DownloadFailed(
                            "Download cancelled by client".to_string(),
                        ));
                    }
                }
            }
        }

        let status = child.wait().await?;
        let last_error = match stderr_task {
            Some(task) => task.await.ok().flatten(),
            None => None,
        };

        if status.success() {
            Ok(())
        } else {
            Err(RelayError::DownloadFailed(last_error.unwrap_or_else(|| {
                format!("yt-dlp exited with {}", status)
            })))
        }
    }
}

/// Translate one line of yt-dlp stdout into a progress event.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let line = line.trim();
    if let Some(fields) = line.strip_prefix(PROGRESS_MARKER) {
        let mut fields = fields.trim().split('|');
        let downloaded = fields.next().and_then(parse_number::<u64>);
        let total = fields.next().and_then(parse_number::<u64>);
        let estimate = fields.next().and_then(parse_number::<f64>).map(|e| e as u64);
        let speed = fields.next().and_then(parse_number::<f64>);
        let eta = fields.next().and_then(parse_number::<f64>).map(|e| e as u64);

        let total = total.or(estimate).filter(|t| *t > 0);
        let percent = match (downloaded, total) {
            // Estimated totals can undershoot the bytes already received.
            (Some(done), Some(total)) => round1(done as f64 / total as f64 * 100.0).min(100.0),
            _ => 0.0,
        };

        return Some(ProgressEvent::Downloading {
            percent,
            downloaded,
            total,
            speed,
            eta,
        });
    }

    if POSTPROCESSORS.iter().any(|tag| line.starts_with(tag)) {
        return Some(ProgressEvent::processing("Converting..."));
    }

    None
}

fn parse_number<T: std::str::FromStr>(field: &str) -> Option<T> {
    match field.trim() {
        "" | "NA" | "None" => None,
        value => value.parse().ok(),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
