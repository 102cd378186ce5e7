//! Store configuration.
//! Hosts may keep a JSON file with overrides; every field falls back to its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_STORAGE_KEY: &str = "kanban-storage";
pub const DEFAULT_BACKUP_PREFIX: &str = "kanban-backup-";
pub const DEFAULT_MAX_BACKUPS: usize = 3;
/// Assumed capacity of the host key-value store (5 MiB).
pub const DEFAULT_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_USAGE_POLL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default = "default_backup_prefix")]
    pub backup_prefix: String,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
    #[serde(default = "default_true")]
    pub backup_before_destructive: bool,
    #[serde(default = "default_usage_poll_secs")]
    pub usage_poll_secs: u64,
    /// Seed the built-in sample board when storage is empty.
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_backup_prefix() -> String {
    DEFAULT_BACKUP_PREFIX.to_string()
}

fn default_max_backups() -> usize {
    DEFAULT_MAX_BACKUPS
}

fn default_capacity_bytes() -> u64 {
    DEFAULT_CAPACITY_BYTES
}

fn default_usage_poll_secs() -> u64 {
    DEFAULT_USAGE_POLL_SECS
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            backup_prefix: default_backup_prefix(),
            max_backups: default_max_backups(),
            capacity_bytes: default_capacity_bytes(),
            backup_before_destructive: true,
            usage_poll_secs: default_usage_poll_secs(),
            seed_defaults: true,
        }
    }
}

impl StoreConfig {
    pub fn usage_poll_interval(&self) -> Duration {
        Duration::from_secs(self.usage_poll_secs.max(1))
    }
}

/// Load config from path. Returns default if the file is missing or unreadable.
pub fn load_config(path: &Path) -> StoreConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(
                "[taskboard.config] Failed to parse config {}: {}",
                path.display(),
                e
            );
            StoreConfig::default()
        }),
        Err(_) => {
            log::info!(
                "[taskboard.config] No config at {}, using defaults",
                path.display()
            );
            StoreConfig::default()
        }
    }
}
