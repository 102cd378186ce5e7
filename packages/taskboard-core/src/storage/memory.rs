//! In-memory key-value backend.
//!
//! Behaves like a browser profile's local storage: an optional byte quota
//! (key length + value length summed over all entries), plus switches to
//! simulate a disabled store or corrupt reads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::{KeyValueStore, KvError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<u64>,
    disabled: AtomicBool,
    corrupt_reads: AtomicBool,
}

fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

impl MemoryStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes pushing the total past `quota_bytes`.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    /// Make every read fail with a corruption error until switched off.
    pub fn set_corrupt_reads(&self, corrupt: bool) {
        self.corrupt_reads.store(corrupt, Ordering::SeqCst);
    }

    pub fn used_bytes(&self) -> u64 {
        self.entries
            .read()
            .map(|e| e.iter().map(|(k, v)| entry_size(k, v)).sum())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_enabled(&self) -> Result<(), KvError> {
        if self.disabled.load(Ordering::SeqCst) {
            return Err(KvError::disabled());
        }
        Ok(())
    }
}

fn poisoned() -> KvError {
    KvError::new("InvalidStateError", "storage lock poisoned")
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check_enabled()?;
        if self.corrupt_reads.load(Ordering::SeqCst) {
            return Err(KvError::new(
                "DataError",
                format!("Stored value for '{}' is corrupted", key),
            ));
        }
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.check_enabled()?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        if let Some(quota) = self.quota_bytes {
            let used: u64 = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
            let replaced = entries.get(key).map(|old| entry_size(key, old)).unwrap_or(0);
            if used - replaced + entry_size(key, value) > quota {
                return Err(KvError::quota_exceeded(key));
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        self.check_enabled()?;
        self.entries.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, KvError> {
        self.check_enabled()?;
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{classify, StorageError};

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.used_bytes(), 2);
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_quota_counts_replacement() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "123456789").unwrap();
        // Replacing the same key frees its old size first
        store.set("k", "abcdefghi").unwrap();
        let err = store.set("x", "y").unwrap_err();
        assert!(matches!(classify(&err), StorageError::QuotaExceeded(_)));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("abcdefghi"));
    }

    #[test]
    fn test_disabled_and_corrupt_modes() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();

        store.set_corrupt_reads(true);
        let err = store.get("k").unwrap_err();
        assert!(matches!(classify(&err), StorageError::Corrupted(_)));
        store.set_corrupt_reads(false);

        store.set_disabled(true);
        assert!(matches!(
            classify(&store.set("k", "w").unwrap_err()),
            StorageError::Disabled(_)
        ));
        store.set_disabled(false);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
