//! Cleanup worker for expired downloads and orphaned scratch directories

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::relay::store::DownloadStore;
use crate::relay::TEMP_DIR_PREFIX;

/// Cleanup worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between purges
    pub interval: Duration,

    /// Scratch directories older than this are removed
    pub orphan_age: Duration,

    /// Where download scratch directories are created
    pub temp_root: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            orphan_age: Duration::from_secs(3600),
            temp_root: std::env::temp_dir(),
        }
    }
}

/// Run the cleanup worker until the shutdown signal fires
pub async fn run<S, F>(
    options: &Options,
    store: &DownloadStore,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Cleanup worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Cleanup worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        let purged = store.purge_expired();
        debug!("Cleanup pass removed {} downloads, {} remaining", purged, store.len());

        let swept = sweep_orphaned_dirs(&options.temp_root, options.orphan_age).await;
        if swept > 0 {
            info!("Removed {} orphaned download directories", swept);
        }
    }
}

/// Remove `catloader_*` directories under `root` last modified over `max_age` ago.
///
/// These are left behind when the process dies before a download's
/// directory guard runs. Returns the number of directories removed.
pub async fn sweep_orphaned_dirs(root: &Path, max_age: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot scan {} for orphaned downloads: {}", root.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped scanning {}: {}", root.display(), e);
                break;
            }
        };
        if !entry.file_name().to_string_lossy().starts_with(TEMP_DIR_PREFIX) {
            continue;
        }

        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_dir() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.elapsed().ok());
        if age.is_none_or(|age| age < max_age) {
            continue;
        }

        match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => {
                debug!("Removed orphaned directory {}", entry.path().display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
        }
    }
    removed
}
