//! In-memory store of finished downloads awaiting one-shot retrieval

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use tempfile::TempDir;
use tracing::{info, warn};

/// Store limits
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a finished download stays retrievable
    pub expiry: Duration,

    /// Maximum finished downloads kept at once
    pub capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(300), // 5 minutes
            capacity: 100,
        }
    }
}

/// A downloaded artifact. Dropping it deletes its temporary directory.
#[derive(Debug)]
pub struct CompletedDownload {
    pub filename: String,
    pub file_size: u64,
    pub content_type: &'static str,
    pub file_path: PathBuf,
    pub dir: TempDir,
    created_at: Instant,
}

impl CompletedDownload {
    pub fn new(
        filename: String,
        file_size: u64,
        content_type: &'static str,
        file_path: PathBuf,
        dir: TempDir,
    ) -> Self {
        Self {
            filename,
            file_size,
            content_type,
            file_path,
            dir,
            created_at: Instant::now(),
        }
    }
}

/// Finished downloads keyed by unguessable id
pub struct DownloadStore {
    options: StoreOptions,
    entries: Mutex<HashMap<String, CompletedDownload>>,
}

impl DownloadStore {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a finished download and return its id.
    ///
    /// Expired entries are purged first; at capacity the oldest entry is evicted.
    pub fn insert(&self, download: CompletedDownload) -> String {
        let id = new_download_id();
        let mut evicted = Vec::new();

        {
            let mut entries = self.lock_entries();
            evicted.extend(take_expired(&mut entries, self.options.expiry));

            if self.options.capacity > 0 && entries.len() >= self.options.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest.and_then(|key| entries.remove(&key)) {
                    warn!("Evicted oldest download due to capacity limit");
                    evicted.push(oldest);
                }
            }

            entries.insert(id.clone(), download);
        }

        // Directory removal happens outside the lock.
        drop(evicted);
        id
    }

    /// Remove and return a download. Each id can be taken once.
    pub fn take(&self, download_id: &str) -> Option<CompletedDownload> {
        self.lock_entries().remove(download_id)
    }

    /// Drop expired downloads, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let expired = take_expired(&mut self.lock_entries(), self.options.expiry);
        let count = expired.len();
        drop(expired);
        if count > 0 {
            info!("Cleaned up {} expired downloads", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CompletedDownload>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn take_expired(
    entries: &mut HashMap<String, CompletedDownload>,
    expiry: Duration,
) -> Vec<CompletedDownload> {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.created_at.elapsed() > expiry)
        .map(|(key, _)| key.clone())
        .collect();
    expired
        .into_iter()
        .filter_map(|key| entries.remove(&key))
        .collect()
}

/// 256 bits from the OS CSPRNG, URL-safe base64 without padding (43 chars).
fn new_download_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
