//! CatLoader hooks - Entry Point
//!
//! Receives signed GitHub push webhooks and runs the deploy script of the
//! matching checkout, one deployment per environment at a time. Optionally
//! serves the download progress relay used by the CatLoader frontend.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use catloader_hooks::app::run::run;
use catloader_hooks::app::settings::Settings;
use catloader_hooks::logs::{init_logging, install_panic_hook};
use catloader_hooks::utils::version_info;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::parse();

    // Print version and exit
    let version = version_info();
    if settings.version {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    // Initialize logging; the guard flushes the file writer on exit
    let _log_guard = match init_logging(settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };
    install_panic_hook();

    let options = match settings.into_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Running CatLoader hooks {} ({}) with options: {:?}",
        version.version, version.git_hash, options
    );
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the webhook service: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received, shutting down...");
    }
}
