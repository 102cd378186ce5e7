//! Identifier helpers.
//!
//! Every entity id is a version-4 UUID in its 36-character dashed lowercase
//! hex form. Random bytes come from the OS source; when that is unavailable
//! the fallback hashes a process counter with the clock and produces the
//! same format.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use uuid::Builder;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new entity id.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => Builder::from_random_bytes(bytes).into_uuid().to_string(),
        Err(e) => {
            log::warn!("[taskboard.id] OS random source unavailable ({}), using fallback", e);
            fallback_id()
        }
    }
}

/// Clock-and-counter id, formatted as a v4 UUID.
pub fn fallback_id() -> String {
    let seq = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(ts.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    Builder::from_random_bytes(bytes).into_uuid().to_string()
}

/// True when `id` has the dashed 8-4-4-4-12 hex layout.
pub fn is_well_formed(id: &str) -> bool {
    id.len() == 36
        && id.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}
