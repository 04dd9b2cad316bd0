use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use spdlog::{debug, error, info};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::post::{parse_header, validate_id};
use crate::post_store::PostStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Post files seen in the content directory.
    pub files: usize,
    pub indexed: usize,
    pub drafts: usize,
    pub skipped: usize,
    pub removed: usize,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "files={}, indexed={}, drafts={}, skipped={}, removed={}",
               self.files, self.indexed, self.drafts, self.skipped, self.removed)
    }
}

/// Reconciles the index with the content directory once.
///
/// New files are indexed from their header only. Indexed posts whose file is
/// gone are dropped from the index; their asset directories stay on disk.
pub fn scan(store: &PostStore) -> Result<ScanReport> {
    let files = store.files().list()?;
    let indexed: HashSet<String> = store.index().ids().iter().cloned().collect();
    let now = store.now();

    let mut report = ScanReport { files: files.len(), ..Default::default() };
    let mut seen = HashSet::with_capacity(files.len());
    let mut found = vec![];

    for file_name in &files {
        let Some(id) = store.id_from_file(file_name) else {
            continue;
        };
        seen.insert(id.to_string());
        if indexed.contains(id) {
            continue;
        }
        if let Err(e) = validate_id(id) {
            error!("Skipping {}: {}", file_name, e);
            report.skipped += 1;
            continue;
        }

        let header = match store.files().read_header(file_name) {
            Ok(header) => header,
            Err(e) => {
                error!("Error reading {}: {}", file_name, e);
                report.skipped += 1;
                continue;
            }
        };
        match parse_header(id, &header, now) {
            Ok(header) if header.meta.draft => report.drafts += 1,
            Ok(header) => found.push(header.meta),
            Err(e) => {
                error!("Skipping {}: {}", file_name, e);
                report.skipped += 1;
            }
        }
    }

    // a listing can race with a write, so look again before dropping anything
    let missing: Vec<String> = indexed.into_iter()
        .filter(|id| !seen.contains(id))
        .filter(|id| !store.files().exists(&store.file_name(id)))
        .collect();

    let (added, removed) = store.index_mut().apply_scan(found, &missing);
    report.indexed = added;
    report.removed = removed;
    Ok(report)
}

/// Background task that keeps rescanning the content directory.
pub struct Poller {
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Scans right away, then again `interval` after each scan finishes.
    /// Must be called from within a tokio runtime.
    pub fn start(store: Arc<PostStore>, interval: Duration) -> Poller {
        let task = tokio::spawn(async move {
            info!("Starting post poller, interval={}s", interval.as_secs());
            loop {
                let scan_store = store.clone();
                match tokio::task::spawn_blocking(move || scan_store.try_scan()).await {
                    Ok(Some(Ok(report))) => info!("Post scan done: {}", report),
                    Ok(Some(Err(e))) => error!("Error scanning posts: {}", e),
                    Ok(None) => debug!("Post scan still running, skipped"),
                    Err(e) => error!("Post scan task failed: {}", e),
                }
                tokio::time::sleep(interval).await;
            }
        });
        Poller { task: Some(task) }
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Post poller stopped");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
