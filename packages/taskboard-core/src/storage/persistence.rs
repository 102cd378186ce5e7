//! Persistence adapter over a key-value store.
//!
//! Stores the encoded snapshot under a single namespaced key with:
//! - Quota recovery: cleanup of transient/backup/cache keys, then one retry
//! - Corrupt reads discarded so the caller can start fresh
//! - Rotating safety backups, newest `max_backups` kept
//! - Usage accounting against an assumed fixed capacity

use std::sync::Arc;

use chrono::Utc;

use super::usage::{self, Recommendation, StorageUsage};
use super::{classify, KeyValueStore, StorageError};
use crate::config::StoreConfig;

/// Namespaces the cleanup pass may remove, besides the backup prefix.
const TRANSIENT_PREFIXES: &[&str] = &["kanban-temp-", "kanban-cache-"];

pub struct Persistence<S: KeyValueStore> {
    kv: Arc<S>,
    storage_key: String,
    backup_prefix: String,
    max_backups: usize,
    capacity_bytes: u64,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(kv: Arc<S>, config: &StoreConfig) -> Self {
        Self {
            kv,
            storage_key: config.storage_key.clone(),
            backup_prefix: config.backup_prefix.clone(),
            max_backups: config.max_backups,
            capacity_bytes: config.capacity_bytes,
        }
    }

    pub fn backend(&self) -> &Arc<S> {
        &self.kv
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Write the snapshot under the storage key.
    pub fn save(&self, payload: &str) -> Result<(), StorageError> {
        self.write_with_retry(&self.storage_key, payload)
    }

    /// Read the snapshot. Empty or missing entries are `Ok(None)`; a read
    /// failure that looks like corruption removes the entry and also
    /// yields `Ok(None)`.
    pub fn load(&self) -> Result<Option<String>, StorageError> {
        match self.kv.get(&self.storage_key) {
            Ok(Some(value)) if !value.trim().is_empty() => Ok(Some(value)),
            Ok(_) => Ok(None),
            Err(e) => match classify(&e) {
                StorageError::Corrupted(msg) => {
                    log::warn!(
                        "[taskboard.persist.load] Discarding corrupted entry {}: {}",
                        self.storage_key,
                        msg
                    );
                    if let Err(e) = self.kv.remove(&self.storage_key) {
                        log::warn!("[taskboard.persist.load] Failed to remove entry: {}", e);
                    }
                    Ok(None)
                }
                other => Err(other),
            },
        }
    }

    /// Remove the snapshot entry.
    pub fn discard(&self) -> Result<(), StorageError> {
        self.kv.remove(&self.storage_key).map_err(|e| classify(&e))
    }

    fn write_with_retry(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let first = match self.kv.set(key, value) {
            Ok(()) => return Ok(()),
            Err(e) => classify(&e),
        };

        if !matches!(first, StorageError::QuotaExceeded(_)) {
            log::error!("[taskboard.persist.write] Write to {} failed: {}", key, first);
            return Err(first);
        }

        let removed = self.cleanup();
        log::warn!(
            "[taskboard.persist.quota] Quota exceeded writing {}, removed {} keys, retrying",
            key,
            removed
        );

        match self.kv.set(key, value) {
            Ok(()) => {
                log::info!("[taskboard.persist.quota] Retry succeeded for {}", key);
                Ok(())
            }
            Err(e) => {
                let err = classify(&e);
                log::error!("[taskboard.persist.quota] Retry failed for {}: {}", key, err);
                Err(err)
            }
        }
    }

    fn is_cleanable(&self, key: &str) -> bool {
        key != self.storage_key
            && (key.starts_with(&self.backup_prefix)
                || TRANSIENT_PREFIXES.iter().any(|p| key.starts_with(p)))
    }

    /// Single pass over the key space removing transient, backup and cache
    /// entries. Returns the number of keys removed.
    pub fn cleanup(&self) -> usize {
        let keys = match self.kv.keys() {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("[taskboard.persist.cleanup] Cannot list keys: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| self.is_cleanable(k)) {
            match self.kv.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("[taskboard.persist.cleanup] Failed to remove {}: {}", key, e),
            }
        }
        removed
    }

    /// Write `payload` as a new timestamped backup and rotate old ones.
    /// Returns the backup key.
    pub fn create_backup(&self, payload: &str) -> Result<String, StorageError> {
        // Keys must sort after every existing backup, even within one millisecond
        let newest = self
            .list_backups()?
            .first()
            .and_then(|k| k[self.backup_prefix.len()..].parse::<i64>().ok());
        let mut millis = Utc::now().timestamp_millis().max(0);
        if let Some(newest) = newest {
            millis = millis.max(newest + 1);
        }
        let key = self.backup_key(millis);

        self.write_with_retry(&key, payload)?;
        log::info!("[taskboard.persist.backup] Created backup {}", key);
        self.rotate_backups()?;
        Ok(key)
    }

    fn backup_key(&self, millis: i64) -> String {
        format!("{}{:013}", self.backup_prefix, millis)
    }

    /// Backup keys, newest first.
    pub fn list_backups(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .kv
            .keys()
            .map_err(|e| classify(&e))?
            .into_iter()
            .filter(|k| k.starts_with(&self.backup_prefix))
            .collect();
        keys.sort_unstable_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    pub fn read_backup(&self, key: &str) -> Result<Option<String>, StorageError> {
        if !key.starts_with(&self.backup_prefix) {
            return Ok(None);
        }
        self.kv.get(key).map_err(|e| classify(&e))
    }

    /// Delete the oldest backups until at most `max_backups` remain.
    fn rotate_backups(&self) -> Result<(), StorageError> {
        let backups = self.list_backups()?;
        for stale in backups.iter().skip(self.max_backups) {
            self.kv.remove(stale).map_err(|e| classify(&e))?;
            log::info!("[taskboard.persist.backup] Rotated out {}", stale);
        }
        Ok(())
    }

    /// Sum of key + value lengths over every entry, against the assumed capacity.
    pub fn usage(&self) -> Result<StorageUsage, StorageError> {
        let mut used = 0u64;
        for key in self.kv.keys().map_err(|e| classify(&e))? {
            let value_len = self
                .kv
                .get(&key)
                .map_err(|e| classify(&e))?
                .map(|v| v.len())
                .unwrap_or(0);
            used += (key.len() + value_len) as u64;
        }
        Ok(StorageUsage::new(used, self.capacity_bytes))
    }

    pub fn recommendations(&self) -> Result<Vec<Recommendation>, StorageError> {
        Ok(usage::recommendations(&self.usage()?))
    }
}
