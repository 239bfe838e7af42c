//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::executor::{Executor, ScriptExecutor};
use crate::deploy::queue::DeploymentQueue;
use crate::errors::HookError;
use crate::models::deployment::Environment;
use crate::relay::store::DownloadStore;
use crate::relay::ytdlp::{MediaFetcher, YtDlp};
use crate::relay::ProgressRelay;
use crate::telemetry::Metrics;
use crate::webhook::dispatcher::Dispatcher;

/// Main application state
pub struct AppState {
    /// Request and deployment counters
    pub metrics: Arc<Metrics>,

    /// Per-environment deployment queue
    pub queue: Arc<DeploymentQueue>,

    /// Push event routing
    pub dispatcher: Arc<Dispatcher>,

    /// Finished downloads awaiting retrieval
    pub store: Arc<DownloadStore>,

    /// Download progress relay
    pub relay: Arc<ProgressRelay>,
}

impl AppState {
    /// Initialize application state with the production executor and fetcher
    pub fn init(options: &AppOptions) -> Self {
        let executor = Arc::new(ScriptExecutor::new(options.executor.clone()));
        let fetcher = Arc::new(YtDlp::new(&options.relay.ytdlp_path));
        Self::with_backends(options, executor, fetcher)
    }

    pub fn with_backends(
        options: &AppOptions,
        executor: Arc<dyn Executor>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        info!("Initializing application state...");

        let metrics = Arc::new(Metrics::new());
        let queue = Arc::new(DeploymentQueue::new(executor, metrics.clone()));
        let dispatcher = Arc::new(Dispatcher::new(options.repos.clone(), queue.clone()));
        let store = Arc::new(DownloadStore::new(options.relay.store.clone()));
        let relay = Arc::new(ProgressRelay::new(
            fetcher,
            store.clone(),
            options.relay.stream.clone(),
        ));

        Self {
            metrics,
            queue,
            dispatcher,
            store,
            relay,
        }
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), HookError> {
        info!("Shutting down application state...");

        for env in Environment::ALL {
            let status = self.queue.status(env);
            if status.running || status.queue_depth > 0 {
                warn!(
                    "Abandoning {} deployments (running: {}, queued: {})",
                    env, status.running, status.queue_depth
                );
            }
        }

        let dropped = self.store.len();
        if dropped > 0 {
            info!("Discarding {} unclaimed downloads", dropped);
        }
        Ok(())
    }
}
