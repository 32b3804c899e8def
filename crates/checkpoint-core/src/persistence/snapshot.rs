//! Session snapshots.
//!
//! A snapshot captures everything needed to rebuild a [`Session`] exactly:
//! files (with version counters), the pending request, queued requests,
//! history and todos. Restoring a snapshot yields a session equal to the
//! one that was saved, including a call still awaiting a decision.
//!
//! Stored as `sessions/<session-id>.json` under the data directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{read_json_optional, remove_if_exists, write_json_atomic};
use crate::gate::PendingApproval;
use crate::session::{HistoryEntry, Session, SessionId, TurnId};
use crate::todos::Todo;
use crate::tools::ToolCallRequest;
use crate::vfs::FileStore;

/// Bumped whenever the snapshot layout changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const SESSIONS_DIR: &str = "sessions";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("No snapshot for session {0}")]
    NotFound(SessionId),

    #[error("Session id {0:?} cannot name a snapshot file")]
    InvalidId(SessionId),

    #[error("Unsupported snapshot format version {found} (expected {SNAPSHOT_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub format_version: u32,
    pub session_id: SessionId,
    pub files: FileStore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<PendingApproval>,
    #[serde(default)]
    pub queued: Vec<ToolCallRequest>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub todos: Vec<Todo>,
    pub current_turn: TurnId,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn capture(session: &Session) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            session_id: session.id.clone(),
            files: session.files.clone(),
            pending_approval: session.pending_approval.clone(),
            queued: session.queued.iter().cloned().collect(),
            history: session.history.clone(),
            todos: session.todos.clone(),
            current_turn: session.current_turn.clone(),
            saved_at: Utc::now(),
        }
    }

    pub fn restore(self) -> Result<Session, SnapshotError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.format_version,
            });
        }
        Ok(Session {
            id: self.session_id,
            files: self.files,
            pending_approval: self.pending_approval,
            queued: self.queued.into(),
            history: self.history,
            todos: self.todos,
            current_turn: self.current_turn,
        })
    }
}

fn sessions_dir(dir: &Path) -> PathBuf {
    dir.join(SESSIONS_DIR)
}

fn snapshot_path(dir: &Path, id: &SessionId) -> Result<PathBuf, SnapshotError> {
    if !id.is_file_safe() {
        return Err(SnapshotError::InvalidId(id.clone()));
    }
    Ok(sessions_dir(dir).join(format!("{}.json", id)))
}

/// Save a snapshot of `session`, returning the file written.
pub fn save_snapshot(dir: &Path, session: &Session) -> Result<PathBuf, SnapshotError> {
    let path = snapshot_path(dir, session.id())?;
    write_json_atomic(&path, &SessionSnapshot::capture(session))?;
    log::debug!("Saved session {} to {}", session.id(), path.display());
    Ok(path)
}

pub fn load_snapshot(dir: &Path, id: &SessionId) -> Result<Session, SnapshotError> {
    let snapshot: SessionSnapshot = read_json_optional(&snapshot_path(dir, id)?)?
        .ok_or_else(|| SnapshotError::NotFound(id.clone()))?;
    snapshot.restore()
}

pub fn delete_snapshot(dir: &Path, id: &SessionId) -> Result<(), SnapshotError> {
    remove_if_exists(&snapshot_path(dir, id)?)?;
    Ok(())
}

/// Ids of every saved session, sorted.
pub fn list_snapshot_ids(dir: &Path) -> Result<Vec<SessionId>, SnapshotError> {
    let dir = sessions_dir(dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(SessionId(stem.to_string()));
        }
    }
    ids.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(ids)
}
