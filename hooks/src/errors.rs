//! Error types for the CatLoader hooks service

use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum HookError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Logging error: {0}")]
    LogError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Relay error: {0}")]
    RelayError(#[from] RelayError),
}

/// Outcome of a single deployment run that did not succeed.
///
/// Exactly one of these (or a successful output) is produced per execution.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Deploy script not found: {0}")]
    ScriptNotFound(String),

    #[error("Deployment timed out after {0:?}")]
    DeployTimeout(std::time::Duration),

    #[error("Deployment failed with exit code {}", exit_code_display(.exit_code))]
    DeployFailed { exit_code: Option<i32> },

    #[error("Failed to spawn deploy script: {0}")]
    SpawnError(#[source] std::io::Error),

    #[error("Deployment panicked: {0}")]
    Panicked(String),

    #[error("Deployment queue dropped the task before it settled")]
    QueueClosed,
}

fn exit_code_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Errors raised by the download progress relay
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Download not found")]
    NotFound,

    #[error("{0}")]
    DownloadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
