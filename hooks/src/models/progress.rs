//! Download progress events streamed over SSE

use serde::{Deserialize, Serialize};

/// One discrete update for a download operation.
///
/// `Complete` and `Error` are terminal; `Waiting` is a liveness heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    Downloading {
        percent: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        downloaded: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
        /// Bytes per second
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        /// Seconds remaining
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eta: Option<u64>,
    },
    Processing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Complete {
        download_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_size: Option<u64>,
    },
    Error {
        message: String,
    },
    Waiting,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        ProgressEvent::Processing {
            message: Some(message.into()),
        }
    }
}

/// Query parameters identifying one download operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_format_id")]
    pub format_id: String,
    #[serde(default)]
    pub audio_only: bool,
}

fn default_format_id() -> String {
    "best".to_string()
}
