//! Gate configuration.
//!
//! Stored as `config.json` in the data directory. Every field is optional
//! in the file:
//!
//! ```json
//! {
//!   "invalidDecisionMode": "reprompt",
//!   "approvalTimeoutSecs": 300,
//!   "maxQueued": 0,
//!   "logDir": "/tmp/checkpoint-logs"
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::persistence::{read_json_optional, write_json_atomic};

const CONFIG_FILE: &str = "config.json";

/// What the gate does when a human sends a decision it cannot accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidDecisionMode {
    /// Keep the call pending and ask again.
    #[default]
    Reprompt,
    /// Decline the call and hand the planner a declined result.
    FailTurn,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateConfig {
    pub invalid_decision_mode: InvalidDecisionMode,

    /// Seconds to wait for a decision before declining. `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_timeout_secs: Option<u64>,

    /// Calls allowed to wait behind a pending one. Zero rejects them.
    pub max_queued: usize,

    /// Directory for per-session transcripts. Disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl GateConfig {
    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }

    /// Load `config.json` from `dir`, or the defaults if it doesn't exist.
    pub fn load(dir: &Path) -> io::Result<Self> {
        Ok(read_json_optional(&dir.join(CONFIG_FILE))?.unwrap_or_default())
    }

    pub fn save(&self, dir: &Path) -> io::Result<()> {
        write_json_atomic(&dir.join(CONFIG_FILE), self)
    }
}
