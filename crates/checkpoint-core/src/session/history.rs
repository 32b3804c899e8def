//! Append-only audit trail of a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::approval::RiskLevel;
use crate::tools::{ToolCallId, ToolCallRequest, ToolResult};

/// What a human (or the session lifecycle) did with an intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionOutcome {
    Accepted,
    Declined,
    Edited,
}

/// Who produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Decider {
    Human,
    /// The session was torn down while the call was pending.
    Cancellation,
    /// No decision arrived before the configured deadline.
    Timeout,
    /// The human sent an invalid decision and the turn was failed.
    InvalidDecision,
}

/// Decision taken on the request of the enclosing [`CallRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub outcome: DecisionOutcome,
    pub decided_by: Decider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// The request actually executed after an edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<ToolCallRequest>,
    pub decided_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(outcome: DecisionOutcome, decided_by: Decider) -> Self {
        Self {
            outcome,
            decided_by,
            note: None,
            replacement: None,
            decided_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn with_replacement(mut self, replacement: ToolCallRequest) -> Self {
        self.replacement = Some(replacement);
        self
    }
}

/// One resolved tool call: the original request, how it was classified,
/// the decision (absent for auto-executed calls) and the result fed back to
/// the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub request: ToolCallRequest,
    /// `None` for calls cancelled while still queued, before classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionRecord>,
    pub result: ToolResult,
    pub completed_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(
        request: ToolCallRequest,
        risk: Option<RiskLevel>,
        decision: Option<DecisionRecord>,
        result: ToolResult,
    ) -> Self {
        Self {
            request,
            risk,
            decision,
            result,
            completed_at: Utc::now(),
        }
    }

    pub fn outcome(&self) -> Option<DecisionOutcome> {
        self.decision.as_ref().map(|d| d.outcome)
    }

    /// Whether the tool facility ran for this call.
    pub fn executed(&self) -> bool {
        !matches!(self.outcome(), Some(DecisionOutcome::Declined))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HistoryEntry {
    Call {
        record: CallRecord,
    },
    FileWritten {
        path: String,
        version: u64,
        size: usize,
        tool: String,
        call_id: ToolCallId,
        at: DateTime<Utc>,
    },
    FileDeleted {
        path: String,
        version: u64,
        tool: String,
        call_id: ToolCallId,
        at: DateTime<Utc>,
    },
    TodosUpdated {
        total: usize,
        completed: usize,
        call_id: ToolCallId,
        at: DateTime<Utc>,
    },
}

impl HistoryEntry {
    pub fn as_call(&self) -> Option<&CallRecord> {
        match self {
            HistoryEntry::Call { record } => Some(record),
            _ => None,
        }
    }
}
