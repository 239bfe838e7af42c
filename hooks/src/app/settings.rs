//! Command line and environment settings

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use secrecy::SecretString;

use crate::app::options::{AppOptions, RelayOptions, ServerOptions};
use crate::deploy::executor::ExecutorOptions;
use crate::errors::HookError;
use crate::logs::{LogLevel, LogOptions};
use crate::relay::store::StoreOptions;
use crate::relay::stream::StreamOptions;
use crate::utils::{parse_millis, parse_secs};
use crate::webhook::dispatcher::RepoPaths;
use crate::workers::cleanup;

/// Shortest accepted webhook secret
pub const MIN_SECRET_LENGTH: usize = 32;

/// CatLoader deployment webhook and download progress relay
#[derive(Parser, Clone)]
#[command(name = "catloader-hooks")]
#[command(about = "Deployment webhook service and download progress relay for CatLoader")]
#[command(disable_version_flag = true)]
pub struct Settings {
    /// Print build information and exit
    #[arg(long)]
    pub version: bool,

    /// Webhook listener port
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 9000)]
    pub port: u16,

    /// Address both listeners bind to
    #[arg(long, env = "WEBHOOK_BIND_ADDRESS", default_value = "127.0.0.1")]
    pub bind_address: String,

    /// Shared HMAC secret, at least 32 characters
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Append-only log file
    #[arg(long, env = "WEBHOOK_LOG_FILE", default_value = "/var/log/catloader/webhook.log")]
    pub log_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WEBHOOK_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[arg(
        long,
        env = "WEBHOOK_LOG_JSON",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: bool,

    /// Maximum request body in bytes
    #[arg(long, env = "WEBHOOK_MAX_BODY_SIZE", default_value_t = 1024 * 1024)]
    pub max_body_size: usize,

    /// Request timeout in milliseconds
    #[arg(long, env = "WEBHOOK_REQUEST_TIMEOUT_MS", default_value = "30000", value_parser = parse_millis)]
    pub request_timeout: Duration,

    /// Deploy script timeout in milliseconds
    #[arg(long, env = "DEPLOY_TIMEOUT_MS", default_value = "600000", value_parser = parse_millis)]
    pub deploy_timeout: Duration,

    /// Production checkout, deployed on pushes to `main`
    #[arg(long, env = "PROD_REPO_PATH", default_value = "/opt/catloader")]
    pub prod_repo_path: PathBuf,

    /// Development checkout, deployed on pushes to `dev`
    #[arg(long, env = "DEV_REPO_PATH", default_value = "/opt/catloader-dev")]
    pub dev_repo_path: PathBuf,

    /// Serve the download progress relay
    #[arg(
        long,
        env = "CATLOADER_RELAY_ENABLED",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub relay_enabled: bool,

    /// Relay listener port
    #[arg(long, env = "CATLOADER_RELAY_PORT", default_value_t = 8000)]
    pub relay_port: u16,

    /// yt-dlp executable
    #[arg(long, env = "CATLOADER_YTDLP_PATH", default_value = "yt-dlp")]
    pub ytdlp_path: String,

    /// SSE stream lifetime in seconds
    #[arg(long, env = "CATLOADER_SSE_TIMEOUT", default_value = "600", value_parser = parse_secs)]
    pub sse_timeout: Duration,

    /// Idle seconds before a `waiting` heartbeat
    #[arg(long, env = "CATLOADER_PROGRESS_POLL_INTERVAL", default_value = "0.5", value_parser = parse_secs)]
    pub progress_poll_interval: Duration,

    /// Seconds a finished download stays retrievable
    #[arg(long, env = "CATLOADER_DOWNLOAD_EXPIRY", default_value = "300", value_parser = parse_secs)]
    pub download_expiry: Duration,

    /// Maximum finished downloads kept at once
    #[arg(long, env = "CATLOADER_MAX_DOWNLOADS", default_value_t = 100)]
    pub max_downloads: usize,

    /// Seconds before an abandoned download directory is swept
    #[arg(long, env = "CATLOADER_ORPHAN_CLEANUP_AGE", default_value = "3600", value_parser = parse_secs)]
    pub orphan_cleanup_age: Duration,
}

impl Settings {
    /// Check the secret
    pub fn validate(&self) -> Result<(), HookError> {
        match self.secret.as_deref() {
            None | Some("") => Err(HookError::ConfigError(
                "WEBHOOK_SECRET is required".to_string(),
            )),
            Some(secret) if secret.chars().count() < MIN_SECRET_LENGTH => {
                Err(HookError::ConfigError(format!(
                    "WEBHOOK_SECRET must be at least {} characters",
                    MIN_SECRET_LENGTH
                )))
            }
            Some(_) => Ok(()),
        }
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            stdout: true,
            log_file: self.log_file.clone(),
            json_format: self.log_json,
        }
    }

    /// Validate and convert into application options
    pub fn into_options(self) -> Result<AppOptions, HookError> {
        self.validate()?;
        let log = self.log_options();
        let secret = SecretString::from(self.secret.unwrap_or_default());

        let mut options = AppOptions::new(secret);
        options.log = log;
        options.server = ServerOptions {
            host: self.bind_address.clone(),
            port: self.port,
            max_body_size: self.max_body_size,
            request_timeout: self.request_timeout,
        };
        options.repos = RepoPaths {
            production: self.prod_repo_path,
            development: self.dev_repo_path,
        };
        options.executor = ExecutorOptions {
            timeout: self.deploy_timeout,
            ..Default::default()
        };
        options.relay = RelayOptions {
            enabled: self.relay_enabled,
            port: self.relay_port,
            ytdlp_path: self.ytdlp_path,
            stream: StreamOptions {
                heartbeat: self.progress_poll_interval,
                timeout: self.sse_timeout,
            },
            store: StoreOptions {
                expiry: self.download_expiry,
                capacity: self.max_downloads,
            },
            cleanup_worker: cleanup::Options {
                orphan_age: self.orphan_cleanup_age,
                ..Default::default()
            },
        };
        Ok(options)
    }
}
