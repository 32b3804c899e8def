//! Per-session state.

use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::history::{CallRecord, Decider, DecisionOutcome, DecisionRecord, HistoryEntry};
use crate::gate::PendingApproval;
use crate::todos::{self, Todo};
use crate::tools::{ToolCallId, ToolCallRequest, ToolResult};
use crate::vfs::{FileStore, FsError, Listing};

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Whether the id can name a file on its own: non-empty ASCII letters,
    /// digits, `-` and `_` only. Ids used in paths must pass this.
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a planning turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) const CANCELLED_MESSAGE: &str = "Session ended before a decision was made.";

/// State of one agent run.
///
/// Files and history only change through the methods below, so every write
/// lands in the store and in the audit trail together. The gate owns
/// `pending_approval` and `queued`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) files: FileStore,
    pub(crate) pending_approval: Option<PendingApproval>,
    pub(crate) queued: VecDeque<ToolCallRequest>,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) todos: Vec<Todo>,
    pub(crate) current_turn: TurnId,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            files: FileStore::new(),
            pending_approval: None,
            queued: VecDeque::new(),
            history: Vec::new(),
            todos: Vec::new(),
            current_turn: TurnId::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn pending_approval(&self) -> Option<&PendingApproval> {
        self.pending_approval.as_ref()
    }

    /// Calls waiting behind the pending one, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.queued.iter()
    }

    pub fn current_turn(&self) -> &TurnId {
        &self.current_turn
    }

    /// Start a new planning turn and return its id.
    pub fn begin_turn(&mut self) -> TurnId {
        self.current_turn = TurnId::new();
        self.current_turn.clone()
    }

    /// Iterator over resolved tool calls, oldest first.
    pub fn calls(&self) -> impl Iterator<Item = &CallRecord> {
        self.history.iter().filter_map(HistoryEntry::as_call)
    }

    // ---------------------------------------------------------------------
    // Filesystem
    // ---------------------------------------------------------------------

    /// Write `content` to `path` on behalf of `tool` and record it.
    pub fn write_file(
        &mut self,
        path: &str,
        content: &str,
        tool: &str,
        call_id: &ToolCallId,
    ) -> u64 {
        let version = self.files.write(path, content, tool);
        self.history.push(HistoryEntry::FileWritten {
            path: path.to_string(),
            version,
            size: content.len(),
            tool: tool.to_string(),
            call_id: call_id.clone(),
            at: Utc::now(),
        });
        version
    }

    pub fn read_file(&self, path: &str) -> Result<&str, FsError> {
        self.files.read(path)
    }

    /// Replace text inside `path`. On failure neither the file nor the
    /// history changes.
    pub fn edit_file(
        &mut self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
        tool: &str,
        call_id: &ToolCallId,
    ) -> Result<u64, FsError> {
        let version = self.files.edit(path, old, new, replace_all, tool)?;
        let size = self.files.get(path).map(|e| e.size()).unwrap_or_default();
        self.history.push(HistoryEntry::FileWritten {
            path: path.to_string(),
            version,
            size,
            tool: tool.to_string(),
            call_id: call_id.clone(),
            at: Utc::now(),
        });
        Ok(version)
    }

    /// Delete `path`, returning the version it had.
    pub fn delete_file(
        &mut self,
        path: &str,
        tool: &str,
        call_id: &ToolCallId,
    ) -> Result<u64, FsError> {
        let removed = self.files.delete(path)?;
        self.history.push(HistoryEntry::FileDeleted {
            path: path.to_string(),
            version: removed.version,
            tool: tool.to_string(),
            call_id: call_id.clone(),
            at: Utc::now(),
        });
        Ok(removed.version)
    }

    pub fn list_files(&self) -> Listing {
        self.files.list()
    }

    pub fn set_todos(&mut self, todos: Vec<Todo>, call_id: &ToolCallId) {
        self.history.push(HistoryEntry::TodosUpdated {
            total: todos.len(),
            completed: todos::completed_count(&todos),
            call_id: call_id.clone(),
            at: Utc::now(),
        });
        self.todos = todos;
    }

    // ---------------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------------

    pub(crate) fn record_call(&mut self, record: CallRecord) {
        self.history.push(HistoryEntry::Call { record });
    }

    /// Decline the pending call without executing it.
    ///
    /// Returns the synthetic result for the planner, or `None` when nothing
    /// was pending.
    pub(crate) fn decline_pending(
        &mut self,
        decided_by: Decider,
        message: &str,
        note: Option<String>,
    ) -> Option<ToolResult> {
        let pending = self.pending_approval.take()?;
        let result = ToolResult::declined(
            pending.request.id().clone(),
            pending.request.tool(),
            message,
        );
        self.record_call(CallRecord::new(
            pending.request,
            Some(pending.risk),
            Some(DecisionRecord::new(DecisionOutcome::Declined, decided_by).with_note(note)),
            result.clone(),
        ));
        Some(result)
    }

    /// Discard the pending call and every queued call without executing
    /// them. Each one is recorded as declined by cancellation.
    pub fn cancel(&mut self) -> Vec<ToolResult> {
        let mut cancelled = Vec::new();
        if let Some(result) = self.decline_pending(Decider::Cancellation, CANCELLED_MESSAGE, None)
        {
            cancelled.push(result);
        }

        while let Some(request) = self.queued.pop_front() {
            let result =
                ToolResult::declined(request.id().clone(), request.tool(), CANCELLED_MESSAGE);
            self.record_call(CallRecord::new(
                request,
                None,
                Some(DecisionRecord::new(
                    DecisionOutcome::Declined,
                    Decider::Cancellation,
                )),
                result.clone(),
            ));
            cancelled.push(result);
        }

        if !cancelled.is_empty() {
            log::info!(
                "Session {}: cancelled {} undecided tool call(s)",
                self.id,
                cancelled.len()
            );
        }
        cancelled
    }
}
