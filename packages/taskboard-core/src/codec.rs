//! Persisted document codec.
//!
//! The stored form is a JSON object `{ boards, currentBoardId, version }`
//! with every temporal field written as ISO-8601 text. Decoding walks the
//! raw document first and re-reads each recognized temporal key, so values
//! written by older or foreign writers in looser date formats come back as
//! dates; anything unreadable is kept as text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::StorageError;
use crate::temporal::Timestamp;
use crate::types::Board;

pub const FORMAT_VERSION: u32 = 1;

/// Keys whose string values are timestamps, at any depth.
pub const TEMPORAL_KEYS: &[&str] = &["createdAt", "updatedAt", "completedAt", "dueDate", "archivedAt"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub boards: Vec<Board>,
    #[serde(default)]
    pub current_board_id: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

impl PersistedState {
    pub fn new(boards: Vec<Board>, current_board_id: Option<String>) -> Self {
        Self {
            boards,
            current_board_id,
            version: FORMAT_VERSION,
        }
    }
}

pub fn encode(state: &PersistedState) -> Result<String, StorageError> {
    Ok(serde_json::to_string(state)?)
}

/// Decode stored text. Malformed documents are reported as `Corrupted`.
pub fn decode(text: &str) -> Result<PersistedState, StorageError> {
    let mut value: Value =
        serde_json::from_str(text).map_err(|e| StorageError::Corrupted(e.to_string()))?;
    revive_temporal_fields(&mut value);
    serde_json::from_value(value).map_err(|e| StorageError::Corrupted(e.to_string()))
}

/// Normalize every recognized temporal string in place: readable values are
/// rewritten in canonical ISO form, unreadable ones are left untouched.
pub fn revive_temporal_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if TEMPORAL_KEYS.contains(&key.as_str()) {
                    if let Value::String(text) = child {
                        let ts = Timestamp::parse(text);
                        if ts.is_parsed() {
                            *text = ts.to_iso_string();
                        }
                    }
                } else {
                    revive_temporal_fields(child);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                revive_temporal_fields(item);
            }
        }
        _ => {}
    }
}
