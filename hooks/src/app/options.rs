//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::executor::ExecutorOptions;
use crate::logs::LogOptions;
use crate::relay::store::StoreOptions;
use crate::relay::stream::StreamOptions;
use crate::webhook::dispatcher::RepoPaths;
use crate::workers::cleanup;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Shared secret for webhook signatures
    pub secret: SecretString,

    /// Webhook server configuration
    pub server: ServerOptions,

    /// Repository checkout per environment
    pub repos: RepoPaths,

    /// Deploy script execution
    pub executor: ExecutorOptions,

    /// Download progress relay
    pub relay: RelayOptions,

    /// Logging
    pub log: LogOptions,
}

impl AppOptions {
    pub fn new(secret: SecretString) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            secret,
            server: ServerOptions::default(),
            repos: RepoPaths::default(),
            executor: ExecutorOptions::default(),
            relay: RelayOptions::default(),
            log: LogOptions::default(),
        }
    }
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum accepted request body in bytes
    pub max_body_size: usize,

    /// Time allowed before response headers are sent
    pub request_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            max_body_size: 1024 * 1024, // 1 MiB
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Download relay options
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Serve the relay endpoints on their own listener
    pub enabled: bool,

    /// Relay listener, sharing the webhook host
    pub port: u16,

    /// yt-dlp executable
    pub ytdlp_path: String,

    pub stream: StreamOptions,
    pub store: StoreOptions,
    pub cleanup_worker: cleanup::Options,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8000,
            ytdlp_path: "yt-dlp".to_string(),
            stream: StreamOptions::default(),
            store: StoreOptions::default(),
            cleanup_worker: cleanup::Options::default(),
        }
    }
}
