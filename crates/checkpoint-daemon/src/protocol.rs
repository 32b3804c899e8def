//! JSON-lines wire format.
//!
//! One request per stdin line:
//!
//! ```json
//! {"id": 1, "command": "propose", "args": {"sessionId": "...", "tool": "delete_file", "args": {"path": "notes.md"}}}
//! ```
//!
//! One response per stdout line:
//!
//! ```json
//! {"id": 1, "success": true, "data": {"outcome": "awaitingDecision", ...}}
//! {"id": 2, "success": false, "error": {"code": "noPendingRequest", "message": "..."}}
//! ```
//!
//! With `--events`, session events are interleaved as `{"event": {...}}`
//! lines.

use checkpoint_core::event_bus::SessionEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Echoed back on the response so clients can match them up.
    #[serde(default)]
    pub id: Option<Value>,
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

/// Stable error codes clients can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    NotFound,
    InvalidDecision,
    NoPendingRequest,
    Busy,
    SessionNotFound,
    BadRequest,
    Io,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    /// Extra context, e.g. the declined result of a failed turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(id: Option<Value>, data: Value) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: Option<Value>, error: ErrorBody) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Unsolicited event line.
#[derive(Debug, Clone, Serialize)]
pub struct Notification<'a> {
    pub event: &'a SessionEvent,
}
