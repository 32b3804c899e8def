//! Human decision payloads and their validation.
//!
//! The human-facing layer sends a loosely-typed payload:
//!
//! ```json
//! { "decision": "edit", "note": "use read instead", "new_tool": "read_file", "new_args": { "path": "x" } }
//! ```
//!
//! Before the gate acts on it, [`DecisionPayload::validate`] turns it into a
//! [`Decision`] or rejects it with a [`DecisionError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::InterruptOptions;
use crate::tools::{ToolArgs, ToolCallRequest};

/// Message fed back to the planner when a human declines without a note.
pub const DEFAULT_DECLINE_MESSAGE: &str = "Request declined by user.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Accept,
    Decline,
    Edit,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DecisionKind::Accept => "accept",
            DecisionKind::Decline => "decline",
            DecisionKind::Edit => "edit",
        };
        write!(f, "{name}")
    }
}

/// Raw decision as received from the human-facing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub decision: DecisionKind,

    #[serde(default, alias = "notes", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Replacement tool name (edit only).
    #[serde(default, alias = "new_action", skip_serializing_if = "Option::is_none")]
    pub new_tool: Option<String>,

    /// Replacement arguments (edit only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_args: Option<ToolArgs>,
}

/// A validated decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept {
        note: Option<String>,
    },
    Decline {
        /// Explanation fed back to the planner.
        message: String,
        note: Option<String>,
    },
    Edit {
        tool: Option<String>,
        args: Option<ToolArgs>,
        note: Option<String>,
    },
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Accept { .. } => DecisionKind::Accept,
            Decision::Decline { .. } => DecisionKind::Decline,
            Decision::Edit { .. } => DecisionKind::Edit,
        }
    }
}

/// Why a decision payload was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecisionError {
    #[error("Malformed decision payload: {0}")]
    Malformed(String),

    #[error("An edit decision needs new_tool or new_args")]
    MissingReplacement,

    #[error("Decision '{0}' cannot carry a replacement tool or arguments")]
    UnexpectedReplacement(DecisionKind),

    #[error("Decision '{kind}' is not permitted for tool {tool}")]
    NotPermitted { kind: DecisionKind, tool: String },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl DecisionPayload {
    pub fn accept() -> Self {
        Self {
            decision: DecisionKind::Accept,
            note: None,
            new_tool: None,
            new_args: None,
        }
    }

    pub fn decline(note: impl Into<String>) -> Self {
        Self {
            decision: DecisionKind::Decline,
            note: Some(note.into()),
            new_tool: None,
            new_args: None,
        }
    }

    pub fn edit(new_tool: Option<String>, new_args: Option<ToolArgs>) -> Self {
        Self {
            decision: DecisionKind::Edit,
            note: None,
            new_tool,
            new_args,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Parse a payload from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, DecisionError> {
        serde_json::from_str(raw).map_err(|e| DecisionError::Malformed(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self, DecisionError> {
        serde_json::from_value(value).map_err(|e| DecisionError::Malformed(e.to_string()))
    }

    /// Validate against the pending `request` and the decision kinds
    /// `options` allow for its tool.
    ///
    /// An edit must name a replacement tool, replacement arguments, or
    /// both; a blank tool name counts as missing. It never falls back to the
    /// original call.
    pub fn validate(
        self,
        request: &ToolCallRequest,
        options: &InterruptOptions,
    ) -> Result<Decision, DecisionError> {
        let permitted = match self.decision {
            DecisionKind::Accept => options.allow_accept,
            DecisionKind::Decline => options.allow_decline,
            DecisionKind::Edit => options.allow_edit,
        };
        if !permitted {
            return Err(DecisionError::NotPermitted {
                kind: self.decision,
                tool: request.tool().to_string(),
            });
        }

        let note = non_empty(self.note);
        let new_tool = non_empty(self.new_tool);

        match self.decision {
            DecisionKind::Accept | DecisionKind::Decline
                if new_tool.is_some() || self.new_args.is_some() =>
            {
                Err(DecisionError::UnexpectedReplacement(self.decision))
            }
            DecisionKind::Accept => Ok(Decision::Accept { note }),
            DecisionKind::Decline => Ok(Decision::Decline {
                message: note
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DECLINE_MESSAGE.to_string()),
                note,
            }),
            DecisionKind::Edit => {
                if new_tool.is_none() && self.new_args.is_none() {
                    return Err(DecisionError::MissingReplacement);
                }
                Ok(Decision::Edit {
                    tool: new_tool,
                    args: self.new_args,
                    note,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TurnId;
    use serde_json::json;

    fn pending() -> ToolCallRequest {
        ToolCallRequest::from_value(
            "delete_file",
            json!({"path": "notes.md"}),
            TurnId::new(),
        )
    }

    fn all() -> InterruptOptions {
        InterruptOptions::default()
    }

    mod parsing {
        use super::*;

        #[test]
        fn parses_minimal_accept() {
            let payload = DecisionPayload::from_json(r#"{"decision": "accept"}"#).unwrap();
            assert_eq!(payload, DecisionPayload::accept());
        }

        #[test]
        fn accepts_original_field_aliases() {
            let payload = DecisionPayload::from_json(
                r#"{"decision": "edit", "notes": "safer", "new_action": "read_file"}"#,
            )
            .unwrap();
            assert_eq!(payload.note.as_deref(), Some("safer"));
            assert_eq!(payload.new_tool.as_deref(), Some("read_file"));
        }

        #[test]
        fn unknown_decision_is_malformed() {
            let err = DecisionPayload::from_json(r#"{"decision": "maybe"}"#).unwrap_err();
            assert!(matches!(err, DecisionError::Malformed(_)));
        }

        #[test]
        fn missing_decision_is_malformed() {
            let err = DecisionPayload::from_value(json!({"note": "hi"})).unwrap_err();
            assert!(matches!(err, DecisionError::Malformed(_)));
        }

        #[test]
        fn non_object_args_are_malformed() {
            let err = DecisionPayload::from_value(json!({"decision": "edit", "new_args": [1]}))
                .unwrap_err();
            assert!(matches!(err, DecisionError::Malformed(_)));
        }
    }

    mod validate {
        use super::*;

        #[test]
        fn accept_is_valid() {
            let decision = DecisionPayload::accept()
                .validate(&pending(), &all())
                .unwrap();
            assert_eq!(decision, Decision::Accept { note: None });
        }

        #[test]
        fn decline_uses_note_as_message() {
            let decision = DecisionPayload::decline("keep the draft")
                .validate(&pending(), &all())
                .unwrap();
            assert_eq!(
                decision,
                Decision::Decline {
                    message: "keep the draft".to_string(),
                    note: Some("keep the draft".to_string()),
                }
            );
        }

        #[test]
        fn decline_without_note_uses_default_message() {
            let payload = DecisionPayload::from_json(r#"{"decision": "decline", "note": " "}"#)
                .unwrap();
            match payload.validate(&pending(), &all()).unwrap() {
                Decision::Decline { message, note } => {
                    assert_eq!(message, DEFAULT_DECLINE_MESSAGE);
                    assert!(note.is_none());
                }
                other => panic!("expected decline, got {other:?}"),
            }
        }

        #[test]
        fn edit_without_replacement_is_invalid() {
            let err = DecisionPayload::edit(None, None)
                .validate(&pending(), &all())
                .unwrap_err();
            assert_eq!(err, DecisionError::MissingReplacement);
        }

        #[test]
        fn edit_with_blank_tool_and_no_args_is_invalid() {
            let err = DecisionPayload::edit(Some("  ".to_string()), None)
                .validate(&pending(), &all())
                .unwrap_err();
            assert_eq!(err, DecisionError::MissingReplacement);
        }

        #[test]
        fn edit_with_tool_only_is_valid() {
            let decision = DecisionPayload::edit(Some("read_file".to_string()), None)
                .validate(&pending(), &all())
                .unwrap();
            assert_eq!(decision.kind(), DecisionKind::Edit);
        }

        #[test]
        fn edit_with_empty_args_is_still_a_replacement() {
            let decision = DecisionPayload::edit(None, Some(ToolArgs::new()))
                .validate(&pending(), &all())
                .unwrap();
            assert_eq!(
                decision,
                Decision::Edit {
                    tool: None,
                    args: Some(ToolArgs::new()),
                    note: None
                }
            );
        }

        #[test]
        fn accept_with_replacement_is_invalid() {
            let mut payload = DecisionPayload::accept();
            payload.new_tool = Some("ls".to_string());
            let err = payload.validate(&pending(), &all()).unwrap_err();
            assert_eq!(
                err,
                DecisionError::UnexpectedReplacement(DecisionKind::Accept)
            );
        }

        #[test]
        fn disallowed_kind_is_invalid() {
            let options = InterruptOptions {
                allow_edit: false,
                ..InterruptOptions::default()
            };
            let err = DecisionPayload::edit(Some("ls".to_string()), None)
                .validate(&pending(), &options)
                .unwrap_err();
            assert_eq!(
                err,
                DecisionError::NotPermitted {
                    kind: DecisionKind::Edit,
                    tool: "delete_file".to_string()
                }
            );
            assert_eq!(
                err.to_string(),
                "Decision 'edit' is not permitted for tool delete_file"
            );
        }
    }
}
