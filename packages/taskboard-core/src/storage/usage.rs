//! Storage usage accounting and the periodic usage poll.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{KeyValueStore, Persistence};

const URGENT_PERCENT: f64 = 90.0;
const ADVISORY_PERCENT: f64 = 75.0;
/// Above this many bytes used, old backups are worth pruning.
const MANY_BACKUPS_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub used: u64,
    pub available: u64,
    pub total: u64,
    pub percentage: f64,
}

impl StorageUsage {
    pub fn new(used: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Self {
            used,
            available: total.saturating_sub(used),
            total,
            percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Recommendation {
    /// More than 90% used.
    ExportUrgently,
    /// Between 75% and 90% used.
    CleanupAdvised,
    ManyBackups,
}

impl Recommendation {
    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::ExportUrgently => {
                "Storage is almost full. Export your boards now to avoid losing changes."
            }
            Recommendation::CleanupAdvised => {
                "Storage is filling up. Consider archiving or deleting old tasks."
            }
            Recommendation::ManyBackups => {
                "Several backups are taking up space. Old backups can be removed."
            }
        }
    }
}

/// Advice tiers for a usage reading.
pub fn recommendations(usage: &StorageUsage) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if usage.percentage > URGENT_PERCENT {
        out.push(Recommendation::ExportUrgently);
    } else if usage.percentage > ADVISORY_PERCENT {
        out.push(Recommendation::CleanupAdvised);
    }
    if usage.used > MANY_BACKUPS_BYTES {
        out.push(Recommendation::ManyBackups);
    }
    out
}

/// Background poll of storage usage on a fixed interval.
///
/// Readings are published through a watch channel. `stop()` (or dropping the
/// monitor) ends the poll. Must be spawned from within a tokio runtime.
pub struct UsageMonitor {
    handle: JoinHandle<()>,
    rx: watch::Receiver<Option<StorageUsage>>,
}

impl UsageMonitor {
    pub fn spawn<S: KeyValueStore + 'static>(
        persistence: Arc<Persistence<S>>,
        interval: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match persistence.usage() {
                    Ok(usage) => {
                        if tx.send(Some(usage)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("[taskboard.persist.usage] Usage poll failed: {}", e);
                    }
                }
            }
        });
        Self { handle, rx }
    }

    /// Most recent reading, if a poll has completed.
    pub fn latest(&self) -> Option<StorageUsage> {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StorageUsage>> {
        self.rx.clone()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for UsageMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
