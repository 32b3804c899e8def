use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::approval::RiskLevel;
use crate::tools::ToolCallRequest;

/// Description shown when the tool's descriptor has none.
pub const DEFAULT_APPROVAL_DESCRIPTION: &str = "Tool execution requires approval.";

/// Lifecycle of a proposed call inside the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Proposed,
    Classified,
    AutoExecute,
    AwaitingDecision,
    Decided,
    Executed,
}

impl std::fmt::Display for CallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallPhase::Proposed => "proposed",
            CallPhase::Classified => "classified",
            CallPhase::AutoExecute => "auto-execute",
            CallPhase::AwaitingDecision => "awaiting-decision",
            CallPhase::Decided => "decided",
            CallPhase::Executed => "executed",
        };
        write!(f, "{name}")
    }
}

/// The one call a session is blocked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub request: ToolCallRequest,
    pub risk: RiskLevel,
    pub description: String,
    pub requested_at: DateTime<Utc>,
}

impl PendingApproval {
    pub fn new(request: ToolCallRequest, risk: RiskLevel, description: impl Into<String>) -> Self {
        Self {
            request,
            risk,
            description: description.into(),
            requested_at: Utc::now(),
        }
    }

    /// Time left before the call has waited `timeout` since it was parked.
    /// Zero once overdue.
    pub fn remaining(&self, timeout: Duration) -> Duration {
        let waited = Utc::now()
            .signed_duration_since(self.requested_at)
            .to_std()
            .unwrap_or_default();
        timeout.saturating_sub(waited)
    }

    pub fn is_overdue(&self, timeout: Duration) -> bool {
        self.remaining(timeout).is_zero()
    }

    /// Message shown to the human deciding on this call.
    ///
    /// ```text
    /// Tool execution requires approval.
    /// Tool: delete_file
    /// Arguments:
    /// {
    ///   "path": "notes.md"
    /// }
    /// ```
    pub fn prompt(&self) -> String {
        let args = serde_json::to_string_pretty(self.request.args())
            .unwrap_or_else(|_| "{}".to_string());
        let description = self.description.trim();
        let header = if description.is_empty() {
            DEFAULT_APPROVAL_DESCRIPTION
        } else {
            description
        };
        format!(
            "{header}\nTool: {}\nArguments:\n{args}",
            self.request.tool()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TurnId;
    use serde_json::json;

    #[test]
    fn prompt_lists_tool_and_arguments() {
        let pending = PendingApproval::new(
            ToolCallRequest::from_value("delete_file", json!({"path": "notes.md"}), TurnId::new()),
            RiskLevel::RequireApproval,
            "Delete a file",
        );
        assert_eq!(
            pending.prompt(),
            "Delete a file\nTool: delete_file\nArguments:\n{\n  \"path\": \"notes.md\"\n}"
        );
    }

    #[test]
    fn blank_description_uses_default() {
        let pending = PendingApproval::new(
            ToolCallRequest::from_value("internet_search", json!({}), TurnId::new()),
            RiskLevel::RequireApproval,
            "  ",
        );
        assert!(pending.prompt().starts_with(DEFAULT_APPROVAL_DESCRIPTION));
    }

    #[test]
    fn overdue_after_timeout() {
        let mut pending = PendingApproval::new(
            ToolCallRequest::from_value("delete_file", json!({"path": "a"}), TurnId::new()),
            RiskLevel::RequireApproval,
            "",
        );
        assert!(!pending.is_overdue(Duration::from_secs(60)));
        assert!(pending.remaining(Duration::from_secs(60)) > Duration::from_secs(59));

        pending.requested_at = Utc::now() - chrono::Duration::seconds(120);
        assert!(pending.is_overdue(Duration::from_secs(60)));
        assert_eq!(pending.remaining(Duration::from_secs(60)), Duration::ZERO);
    }

    #[test]
    fn phase_display() {
        assert_eq!(CallPhase::AwaitingDecision.to_string(), "awaiting-decision");
    }
}
