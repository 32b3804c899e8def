//! Tool calls, tool results, and the tool execution facility.
//!
//! A [`ToolCallRequest`] is what the planner proposes. It never changes after
//! creation: when a human edits a call, the gate builds a replacement request
//! that points back at the original, so the audit trail keeps both.

pub mod builtin;
mod registry;

pub use registry::{ArgKind, ArgSpec, ToolCategory, ToolDescriptor, ToolHandler, ToolRegistry};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::session::{Session, TurnId};
use crate::todos::Todo;
use crate::vfs::FsError;

/// Argument mapping of a tool call.
pub type ToolArgs = serde_json::Map<String, Value>;

/// Unique identifier for a proposed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallId(pub String);

impl ToolCallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ToolCallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ToolCallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A proposed invocation of a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    id: ToolCallId,
    tool: String,
    args: ToolArgs,
    turn: TurnId,
    /// Set on replacements built from a human edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replaces: Option<ToolCallId>,
}

impl ToolCallRequest {
    pub fn new(tool: impl Into<String>, args: ToolArgs, turn: TurnId) -> Self {
        Self {
            id: ToolCallId::new(),
            tool: tool.into(),
            args,
            turn,
            replaces: None,
        }
    }

    /// Build a request from a JSON value; anything other than an object
    /// becomes an empty argument map.
    pub fn from_value(tool: impl Into<String>, args: Value, turn: TurnId) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => ToolArgs::new(),
        };
        Self::new(tool, args, turn)
    }

    pub fn id(&self) -> &ToolCallId {
        &self.id
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn args(&self) -> &ToolArgs {
        &self.args
    }

    pub fn turn(&self) -> &TurnId {
        &self.turn
    }

    pub fn replaces(&self) -> Option<&ToolCallId> {
        self.replaces.as_ref()
    }

    /// New request substituting the tool name and/or arguments.
    ///
    /// Missing parts are taken from `self`. The replacement gets its own id
    /// and stays in the same turn.
    pub fn replacement(&self, tool: Option<String>, args: Option<ToolArgs>) -> Self {
        Self {
            id: ToolCallId::new(),
            tool: tool.unwrap_or_else(|| self.tool.clone()),
            args: args.unwrap_or_else(|| self.args.clone()),
            turn: self.turn.clone(),
            replaces: Some(self.id.clone()),
        }
    }
}

/// Outcome of a tool call as fed back to the planner.
///
/// `Declined` is never produced by a tool; it only comes from a human (or a
/// cancellation), so declines stay distinguishable from failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ToolResult {
    Success {
        call_id: ToolCallId,
        tool: String,
        output: Value,
    },
    Error {
        call_id: ToolCallId,
        tool: String,
        message: String,
    },
    Declined {
        call_id: ToolCallId,
        tool: String,
        message: String,
    },
}

impl ToolResult {
    pub fn success(call_id: ToolCallId, tool: impl Into<String>, output: Value) -> Self {
        ToolResult::Success {
            call_id,
            tool: tool.into(),
            output,
        }
    }

    pub fn error(call_id: ToolCallId, tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolResult::Error {
            call_id,
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn declined(
        call_id: ToolCallId,
        tool: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ToolResult::Declined {
            call_id,
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn call_id(&self) -> &ToolCallId {
        match self {
            ToolResult::Success { call_id, .. }
            | ToolResult::Error { call_id, .. }
            | ToolResult::Declined { call_id, .. } => call_id,
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            ToolResult::Success { tool, .. }
            | ToolResult::Error { tool, .. }
            | ToolResult::Declined { tool, .. } => tool,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error { .. })
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, ToolResult::Declined { .. })
    }

    /// Re-key the result to another call, keeping everything else.
    pub fn with_call_id(self, call_id: ToolCallId) -> Self {
        match self {
            ToolResult::Success { tool, output, .. } => ToolResult::Success {
                call_id,
                tool,
                output,
            },
            ToolResult::Error { tool, message, .. } => ToolResult::Error {
                call_id,
                tool,
                message,
            },
            ToolResult::Declined { tool, message, .. } => ToolResult::Declined {
                call_id,
                tool,
                message,
            },
        }
    }

    /// Plain-text rendering for the planner's next input.
    pub fn content(&self) -> String {
        match self {
            ToolResult::Success { output, .. } => match output {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            ToolResult::Error { message, .. } => format!("Error: {message}"),
            ToolResult::Declined { message, .. } => format!("Declined: {message}"),
        }
    }
}

/// Failure raised by the tool execution facility.
///
/// Never fatal to a session: the gate folds it into [`ToolResult::Error`].
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("{0}")]
    Failed(String),
}

/// Everything a tool handler may touch while it runs.
///
/// Session state and the call identity are passed in explicitly; handlers
/// have no other way to reach the session.
pub struct ToolContext<'a> {
    pub session: &'a mut Session,
    pub call_id: &'a ToolCallId,
    pub tool: &'a str,
}

impl<'a> ToolContext<'a> {
    pub fn new(session: &'a mut Session, call_id: &'a ToolCallId, tool: &'a str) -> Self {
        Self {
            session,
            call_id,
            tool,
        }
    }

    pub fn write_file(&mut self, path: &str, content: &str) -> u64 {
        self.session
            .write_file(path, content, self.tool, self.call_id)
    }

    pub fn read_file(&self, path: &str) -> Result<&str, FsError> {
        self.session.read_file(path)
    }

    pub fn edit_file(
        &mut self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<u64, FsError> {
        self.session
            .edit_file(path, old, new, replace_all, self.tool, self.call_id)
    }

    pub fn delete_file(&mut self, path: &str) -> Result<u64, FsError> {
        self.session.delete_file(path, self.tool, self.call_id)
    }

    pub fn set_todos(&mut self, todos: Vec<Todo>) {
        self.session.set_todos(todos, self.call_id);
    }
}
