pub mod file;
pub mod memory;
pub mod persistence;
pub mod usage;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use persistence::Persistence;
pub use usage::{Recommendation, StorageUsage, UsageMonitor};

/// Message fragments that mark a write failure as quota-exceeded.
const QUOTA_MARKERS: &[&str] = &[
    "quota exceeded",
    "quota has been exceeded",
    "storage quota exceeded",
    "exceeded the quota",
    "not enough space",
    "disk full",
];
const QUOTA_ERROR_NAME: &str = "QuotaExceededError";

const DISABLED_MARKERS: &[&str] = &["disabled", "access denied", "access is denied", "not available"];
const DISABLED_ERROR_NAME: &str = "SecurityError";

const CORRUPTION_MARKERS: &[&str] = &["corrupt", "invalid", "malformed", "unexpected token", "parse"];

/// Abstract synchronous key-value store, shaped like a browser's local storage.
/// Implementations: MemoryStore (tests, ephemeral hosts), FileStore (one JSON file).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    fn remove(&self, key: &str) -> Result<(), KvError>;

    /// All keys currently held, in no particular order.
    fn keys(&self) -> Result<Vec<String>, KvError>;
}

/// Raw failure reported by a key-value backend: an error name plus message,
/// the way a host exception carries them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct KvError {
    pub name: String,
    pub message: String,
}

impl KvError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn quota_exceeded(key: &str) -> Self {
        Self::new(
            QUOTA_ERROR_NAME,
            format!("Setting the value of '{}' exceeded the quota.", key),
        )
    }

    pub fn disabled() -> Self {
        Self::new(DISABLED_ERROR_NAME, "Access is denied: storage is disabled")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Storage is disabled: {0}")]
    Disabled(String),

    #[error("Stored data is corrupted: {0}")]
    Corrupted(String),

    #[error("Storage error ({name}): {message}")]
    Backend { name: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Stable code for UI collaborators.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            StorageError::Disabled(_) => "STORAGE_DISABLED",
            StorageError::Corrupted(_) => "CORRUPTED",
            StorageError::Backend { .. } => "STORAGE_ERROR",
            StorageError::Serialization(_) => "SERIALIZATION_ERROR",
            StorageError::Io(_) => "IO_ERROR",
        }
    }

    /// Disabled storage cannot be recovered locally.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StorageError::Disabled(_))
    }
}

pub fn is_quota_error(err: &KvError) -> bool {
    if err.name == QUOTA_ERROR_NAME {
        return true;
    }
    let message = err.message.to_lowercase();
    QUOTA_MARKERS.iter().any(|m| message.contains(m))
}

/// Map a raw backend error into the storage taxonomy.
pub fn classify(err: &KvError) -> StorageError {
    if is_quota_error(err) {
        return StorageError::QuotaExceeded(err.message.clone());
    }
    let message = err.message.to_lowercase();
    if err.name == DISABLED_ERROR_NAME || DISABLED_MARKERS.iter().any(|m| message.contains(m)) {
        return StorageError::Disabled(err.message.clone());
    }
    if CORRUPTION_MARKERS.iter().any(|m| message.contains(m)) {
        return StorageError::Corrupted(err.message.clone());
    }
    StorageError::Backend {
        name: err.name.clone(),
        message: err.message.clone(),
    }
}
