//! File-backed key-value store.
//!
//! Keeps the whole key space as a single JSON object on disk with:
//! - Atomic writes (write to .tmp, fsync, rename)
//! - A byte quota over key + value lengths, like a browser profile
//! - A damaged file moved aside to `<name>.corrupt` instead of being overwritten

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::{KeyValueStore, KvError};

/// errno for "no space left on device" on Linux and macOS.
const ENOSPC: i32 = 28;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    quota_bytes: u64,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create on first write) the store at `path`.
    pub fn open(path: &Path, quota_bytes: u64) -> Result<Self, io::Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    let aside = path.with_extension("corrupt");
                    log::warn!(
                        "[taskboard.storage.file] Unreadable store {:?} ({}), moved to {:?}",
                        path,
                        e,
                        aside
                    );
                    fs::rename(path, &aside)?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            path: path.to_path_buf(),
            quota_bytes,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), KvError> {
        let content = serde_json::to_string(entries)
            .map_err(|e| KvError::new("DataError", e.to_string()))?;
        Self::atomic_write(&self.path, &content).map_err(io_to_kv)
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
    fn atomic_write(path: &Path, content: &str) -> Result<(), io::Error> {
        let tmp_path = path.with_extension("taskboard.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

fn io_to_kv(e: io::Error) -> KvError {
    if e.raw_os_error() == Some(ENOSPC) {
        return KvError::new("QuotaExceededError", format!("disk full: {}", e));
    }
    match e.kind() {
        io::ErrorKind::PermissionDenied => KvError::new("SecurityError", e.to_string()),
        _ => KvError::new("IoError", e.to_string()),
    }
}

fn poisoned() -> KvError {
    KvError::new("InvalidStateError", "storage lock poisoned")
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        let used: u64 = entries.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum();
        let replaced = entries
            .get(key)
            .map(|old| (key.len() + old.len()) as u64)
            .unwrap_or(0);
        if used - replaced + (key.len() + value.len()) as u64 > self.quota_bytes {
            return Err(KvError::quota_exceeded(key));
        }

        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&entries) {
            // Keep memory in step with disk
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if let Some(old) = entries.remove(key) {
            if let Err(e) = self.flush(&entries) {
                entries.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, KvError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.keys().cloned().collect())
    }
}
