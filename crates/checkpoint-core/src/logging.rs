//! Per-session transcript files.
//!
//! Separate from the `log` facade: a transcript records what the planner
//! proposed, what the human decided and what came back, one timestamped
//! line per step, so a session can be audited after the fact.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

/// Thread-safe handle to an append-only transcript file.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// Current UTC time as ISO 8601 with milliseconds (e.g. 2026-02-04T10:15:30.123Z).
fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write a timestamped line to the transcript (if present).
pub fn log_line(handle: &LogHandle, direction: &str, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let ts = utc_timestamp();
            let _ = writeln!(file, "[{}] {}: {}", ts, direction, data);
            let _ = file.flush();
        }
    }
}

/// Open (or create) `{log_dir}/{log_id}.log` and return a shared handle.
///
/// With no directory, an id that is not a plain file name, or a file that
/// can't be opened, the handle is empty and [`log_line`] does nothing.
pub fn open_log_file(log_dir: Option<&Path>, log_id: &str) -> LogHandle {
    let plain = !log_id.is_empty()
        && log_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if log_dir.is_some() && !plain {
        log::warn!("Refusing transcript name {:?}", log_id);
        return Arc::new(Mutex::new(None));
    }
    let file = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", log_id)))
            .map_err(|e| log::warn!("Failed to open transcript in {}: {}", dir.display(), e))
            .ok()
    });
    Arc::new(Mutex::new(file))
}
