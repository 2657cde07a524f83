//! Persistence operations for the InMemory engine
//!
//! Snapshots are JSON objects mapping hex-encoded keys to hex-encoded values,
//! tagged with a format version.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::InMemory;
use crate::{Error, Result, backend::errors::BackendError};

/// The current snapshot format version.
const PERSISTENCE_VERSION: u8 = 0;

/// Helper to check if version is default (0) for serde skip_serializing_if
fn is_v0(v: &u8) -> bool {
    *v == 0
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    /// File format version for compatibility checking
    #[serde(rename = "_v", default, skip_serializing_if = "is_v0")]
    version: u8,
    entries: BTreeMap<String, String>,
}

/// Saves the whole keyspace to `path` as JSON.
pub(crate) async fn save_to_file<P: AsRef<Path>>(backend: &InMemory, path: P) -> Result<()> {
    let entries = backend
        .data
        .read()
        .await
        .iter()
        .map(|(k, v)| (hex::encode(k), hex::encode(v)))
        .collect();

    let snapshot = Snapshot {
        version: PERSISTENCE_VERSION,
        entries,
    };

    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| -> Error { BackendError::SerializationFailed { source: e }.into() })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| -> Error { BackendError::FileIo { source: e }.into() })
}

/// Loads a keyspace from a JSON snapshot.
///
/// If the file does not exist, a new, empty `InMemory` engine is returned.
pub(crate) async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<InMemory> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(InMemory::new()),
        Err(e) => return Err(BackendError::FileIo { source: e }.into()),
    };

    let snapshot: Snapshot = serde_json::from_str(&json)
        .map_err(|e| -> Error { BackendError::DeserializationFailed { source: e }.into() })?;
    if snapshot.version != PERSISTENCE_VERSION {
        return Err(BackendError::UnsupportedVersion {
            found: snapshot.version,
            expected: PERSISTENCE_VERSION,
        }
        .into());
    }

    let mut data = BTreeMap::new();
    for (key, value) in snapshot.entries {
        let decode = |field: &str| {
            hex::decode(field).map_err(|e| BackendError::CorruptSnapshot {
                reason: format!("{field}: {e}"),
            })
        };
        data.insert(decode(&key)?, decode(&value)?);
    }

    Ok(InMemory {
        data: RwLock::new(data),
    })
}
