//! Tool approval logic.
//!
//! Determines whether a proposed tool call runs immediately or waits for a
//! human, based on:
//! - Exact tool-name rules
//! - Tool-name prefix rules (e.g. every `mcp__search_` tool)
//! - Tool-category rules
//! - The risk declared by the tool's descriptor
//!
//! Anything no rule covers requires approval.

mod decision;
mod policy;

pub use decision::{Decision, DecisionError, DecisionKind, DecisionPayload, DEFAULT_DECLINE_MESSAGE};
pub use policy::{ApprovalPolicy, Classification, InterruptOptions, RuleSource};

use serde::{Deserialize, Serialize};

/// Risk classification of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskLevel {
    /// Execute without asking.
    Auto,
    /// Suspend until a human decides.
    RequireApproval,
}

impl RiskLevel {
    pub fn requires_approval(self) -> bool {
        self == RiskLevel::RequireApproval
    }
}
