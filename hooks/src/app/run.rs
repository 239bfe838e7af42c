//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::HookError;
use crate::server::serve::{serve, serve_relay};
use crate::server::state::ServerState;
use crate::workers::cleanup;

/// Run the webhook service until the shutdown signal fires
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), HookError> {
    let app_state = Arc::new(AppState::init(&options));
    run_with_state(options, app_state, shutdown_signal).await
}

/// Run with pre-built state, e.g. with substituted executors
pub async fn run_with_state(
    options: AppOptions,
    app_state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), HookError> {
    info!("Initializing CatLoader webhook service...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager =
        ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());
    shutdown_manager.with_app_state(app_state.clone())?;

    if let Err(e) = init(&options, app_state, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start webhook service: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), HookError> {
    let server_state = Arc::new(ServerState::new(options.secret.clone(), &app_state));

    init_webhook_server(
        options,
        server_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    if options.relay.enabled {
        init_relay_server(
            options,
            server_state,
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;

        init_cleanup_worker(
            options.relay.cleanup_worker.clone(),
            app_state,
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(())
}

async fn init_webhook_server(
    options: &AppOptions,
    server_state: Arc<ServerState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), HookError> {
    info!("Initializing webhook server...");

    let handle = serve(&options.server, server_state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_webhook_server_handle(handle)
}

async fn init_relay_server(
    options: &AppOptions,
    server_state: Arc<ServerState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), HookError> {
    info!("Initializing download relay server...");

    let handle = serve_relay(
        &options.server.host,
        options.relay.port,
        server_state,
        async move {
            let _ = shutdown_rx.recv().await;
        },
    )
    .await?;

    shutdown_manager.with_relay_server_handle(handle)
}

fn init_cleanup_worker(
    options: cleanup::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), HookError> {
    info!("Initializing cleanup worker...");

    let store = app_state.store.clone();
    let handle = tokio::spawn(async move {
        cleanup::run(
            &options,
            store.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_cleanup_worker_handle(handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    webhook_server_handle: Option<JoinHandle<Result<(), HookError>>>,
    relay_server_handle: Option<JoinHandle<Result<(), HookError>>>,
    cleanup_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            webhook_server_handle: None,
            relay_server_handle: None,
            cleanup_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), HookError> {
        if self.app_state.is_some() {
            return Err(HookError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_webhook_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), HookError>>,
    ) -> Result<(), HookError> {
        if self.webhook_server_handle.is_some() {
            return Err(HookError::ShutdownError(
                "webhook_server_handle already set".to_string(),
            ));
        }
        self.webhook_server_handle = Some(handle);
        Ok(())
    }

    pub fn with_relay_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), HookError>>,
    ) -> Result<(), HookError> {
        if self.relay_server_handle.is_some() {
            return Err(HookError::ShutdownError(
                "relay_server_handle already set".to_string(),
            ));
        }
        self.relay_server_handle = Some(handle);
        Ok(())
    }

    pub fn with_cleanup_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), HookError> {
        if self.cleanup_worker_handle.is_some() {
            return Err(HookError::ShutdownError(
                "cleanup_worker_handle already set".to_string(),
            ));
        }
        self.cleanup_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), HookError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), HookError> {
        info!("Shutting down CatLoader webhook service...");

        // 1. Cleanup worker
        if let Some(handle) = self.cleanup_worker_handle.take() {
            handle
                .await
                .map_err(|e| HookError::ShutdownError(e.to_string()))?;
        }

        // 2. Relay server
        if let Some(handle) = self.relay_server_handle.take() {
            handle
                .await
                .map_err(|e| HookError::ShutdownError(e.to_string()))??;
        }

        // 3. Webhook server
        if let Some(handle) = self.webhook_server_handle.take() {
            handle
                .await
                .map_err(|e| HookError::ShutdownError(e.to_string()))??;
        }

        // 4. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
