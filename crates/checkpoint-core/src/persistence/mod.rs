//! Persistence layer for sessions, policies, and configuration.
//!
//! # File Locations
//!
//! All data lives under the data directory (see [`crate::paths`]):
//!
//! ```text
//! ~/.checkpoint/
//! ├── config.json              # GateConfig
//! ├── policy.json              # ApprovalPolicy
//! ├── logs/                    # Per-session transcripts (optional)
//! └── sessions/
//!     ├── <session-id>.json    # Session snapshots
//!     └── ...
//! ```
//!
//! # Atomic Writes
//!
//! All save operations write to `file.json.tmp` and rename over
//! `file.json`, so a crash mid-write never leaves a truncated file.

pub mod policy;
pub mod snapshot;

pub use policy::{delete_policy, load_policy, save_policy};
pub use snapshot::{
    delete_snapshot, list_snapshot_ids, load_snapshot, save_snapshot, SessionSnapshot,
    SnapshotError, SNAPSHOT_FORMAT_VERSION,
};

use std::fs;
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read JSON from `path`, returning `None` when the file does not exist.
pub(crate) fn read_json_optional<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Remove `path`; a missing file is not an error.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
