//! Tool-call interception gate.
//!
//! Every call the planner proposes passes through [`Gate::propose`]. The
//! gate classifies it with the [`ApprovalPolicy`]; auto calls run at once,
//! everything else becomes the session's [`PendingApproval`] and waits for
//! [`Gate::decide`].
//!
//! ```text
//! Proposed -> Classified -> AutoExecute ---------------------> Executed
//!                        \-> AwaitingDecision -> Decided -+--> Executed
//!                                                         \--> (declined)
//! ```
//!
//! A session holds at most one pending call. Calls proposed while one is
//! pending are queued when [`GateConfig::max_queued`] allows it and rejected
//! with [`GateError::Busy`] otherwise.
//!
//! The gate itself is stateless across sessions: all per-session state lives
//! in [`Session`], so one gate can serve many sessions.

mod pending;

pub use pending::{CallPhase, PendingApproval, DEFAULT_APPROVAL_DESCRIPTION};

use std::sync::Arc;

use thiserror::Error;

use crate::approval::{
    ApprovalPolicy, Classification, Decision, DecisionError, DecisionPayload,
};
use crate::config::{GateConfig, InvalidDecisionMode};
use crate::session::{CallRecord, Decider, DecisionOutcome, DecisionRecord, Session};
use crate::tools::{ToolCallId, ToolCallRequest, ToolRegistry, ToolResult};

/// Message fed back to the planner when the approval deadline passes.
pub const TIMEOUT_MESSAGE: &str = "No decision was made before the approval deadline.";

/// What happened to a proposed call.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// The call ran immediately.
    Executed(ToolResult),
    /// The call now waits for a human decision.
    AwaitingDecision(PendingApproval),
    /// Another call is pending; this one waits in line at `position`
    /// (1 = next).
    Queued { call_id: ToolCallId, position: usize },
}

/// Structural gate errors. None of them ends the session, and none of them
/// is a tool outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("No tool call is awaiting a decision")]
    NoPendingRequest,

    /// `resolved` is set when the gate failed the call instead of
    /// re-prompting; it holds the declined result for the planner.
    #[error("Invalid decision: {reason}")]
    InvalidDecision {
        reason: DecisionError,
        resolved: Option<ToolResult>,
    },

    #[error("Tool call {pending} is still awaiting a decision")]
    Busy { pending: ToolCallId },
}

fn trace(call_id: &ToolCallId, tool: &str, phase: CallPhase) {
    log::debug!("Call {} ({}) -> {}", call_id, tool, phase);
}

pub struct Gate {
    registry: Arc<ToolRegistry>,
    policy: ApprovalPolicy,
    config: GateConfig,
}

impl Gate {
    pub fn new(registry: Arc<ToolRegistry>, policy: ApprovalPolicy) -> Self {
        Self::with_config(registry, policy, GateConfig::default())
    }

    pub fn with_config(
        registry: Arc<ToolRegistry>,
        policy: ApprovalPolicy,
        config: GateConfig,
    ) -> Self {
        Self {
            registry,
            policy,
            config,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn classify(&self, tool: &str) -> Classification {
        self.policy.classify(tool, self.registry.get(tool))
    }

    /// Route a proposed call.
    pub fn propose(
        &self,
        session: &mut Session,
        request: ToolCallRequest,
    ) -> Result<GateOutcome, GateError> {
        trace(request.id(), request.tool(), CallPhase::Proposed);

        if let Some(pending) = &session.pending_approval {
            if session.queued.len() >= self.config.max_queued {
                log::warn!(
                    "Session {}: rejected call to '{}' while {} is pending",
                    session.id(),
                    request.tool(),
                    pending.request.id()
                );
                return Err(GateError::Busy {
                    pending: pending.request.id().clone(),
                });
            }
            let call_id = request.id().clone();
            session.queued.push_back(request);
            let position = session.queued.len();
            log::info!(
                "Session {}: queued call {} at position {}",
                session.id(),
                call_id,
                position
            );
            return Ok(GateOutcome::Queued { call_id, position });
        }

        Ok(self.admit(session, request))
    }

    /// The pending call, if any.
    pub fn pending<'a>(&self, session: &'a Session) -> Option<&'a PendingApproval> {
        session.pending_approval()
    }

    /// Apply a human decision to the pending call.
    ///
    /// Returns the result fed back to the planner. For an edit, that is the
    /// replacement's result keyed to the original call id.
    pub fn decide(
        &self,
        session: &mut Session,
        payload: DecisionPayload,
    ) -> Result<ToolResult, GateError> {
        let Some(pending) = &session.pending_approval else {
            log::warn!(
                "Session {}: '{}' decision with nothing pending",
                session.id(),
                payload.decision
            );
            return Err(GateError::NoPendingRequest);
        };

        let options = self.policy.interrupt_options(pending.request.tool());
        let decision = match payload.validate(&pending.request, &options) {
            Ok(decision) => decision,
            Err(reason) => return Err(self.reject(session, reason)),
        };
        let Some(pending) = session.pending_approval.take() else {
            return Err(GateError::NoPendingRequest);
        };
        Ok(self.apply(session, pending, decision))
    }

    /// Like [`Gate::decide`], but parses the payload from JSON first. A
    /// payload that does not parse is an invalid decision.
    pub fn decide_json(&self, session: &mut Session, raw: &str) -> Result<ToolResult, GateError> {
        if session.pending_approval.is_none() {
            log::warn!("Session {}: decision with nothing pending", session.id());
            return Err(GateError::NoPendingRequest);
        }
        match DecisionPayload::from_json(raw) {
            Ok(payload) => self.decide(session, payload),
            Err(reason) => Err(self.reject(session, reason)),
        }
    }

    /// Decline the pending call on behalf of `decided_by` without running
    /// it. Used for approval timeouts.
    pub fn expire(&self, session: &mut Session, decided_by: Decider) -> Option<ToolResult> {
        let result = session.decline_pending(decided_by, TIMEOUT_MESSAGE, None)?;
        log::info!(
            "Session {}: call {} expired without a decision",
            session.id(),
            result.call_id()
        );
        Some(result)
    }

    /// Expire the pending call once it has outlived the configured approval
    /// timeout. Does nothing when no timeout is configured.
    pub fn expire_overdue(&self, session: &mut Session) -> Option<ToolResult> {
        let timeout = self.config.approval_timeout()?;
        if !session.pending_approval.as_ref()?.is_overdue(timeout) {
            return None;
        }
        self.expire(session, Decider::Timeout)
    }

    /// Admit the oldest queued call once nothing is pending.
    ///
    /// Returns `None` when a call is still pending or the queue is empty.
    pub fn resume_queued(&self, session: &mut Session) -> Option<GateOutcome> {
        if session.pending_approval.is_some() {
            return None;
        }
        let request = session.queued.pop_front()?;
        Some(self.admit(session, request))
    }

    fn admit(&self, session: &mut Session, request: ToolCallRequest) -> GateOutcome {
        let classification = self.classify(request.tool());
        trace(request.id(), request.tool(), CallPhase::Classified);
        log::debug!(
            "Call {} classified {:?} by {:?}",
            request.id(),
            classification.risk,
            classification.source
        );

        if !classification.risk.requires_approval() {
            trace(request.id(), request.tool(), CallPhase::AutoExecute);
            let result = self.registry.execute(session, &request);
            trace(request.id(), request.tool(), CallPhase::Executed);
            session.record_call(CallRecord::new(
                request,
                Some(classification.risk),
                None,
                result.clone(),
            ));
            return GateOutcome::Executed(result);
        }

        let description = self
            .registry
            .get(request.tool())
            .map(|d| d.description.clone())
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APPROVAL_DESCRIPTION.to_string());
        trace(request.id(), request.tool(), CallPhase::AwaitingDecision);
        log::info!(
            "Session {}: call to '{}' awaits approval",
            session.id(),
            request.tool()
        );
        let pending = PendingApproval::new(request, classification.risk, description);
        session.pending_approval = Some(pending.clone());
        GateOutcome::AwaitingDecision(pending)
    }

    fn apply(
        &self,
        session: &mut Session,
        pending: PendingApproval,
        decision: Decision,
    ) -> ToolResult {
        let request = pending.request;
        trace(request.id(), request.tool(), CallPhase::Decided);

        let (result, record) = match decision {
            Decision::Accept { note } => {
                log::info!("User approved tool '{}'", request.tool());
                let result = self.registry.execute(session, &request);
                trace(request.id(), request.tool(), CallPhase::Executed);
                let record =
                    DecisionRecord::new(DecisionOutcome::Accepted, Decider::Human).with_note(note);
                (result, record)
            }
            Decision::Decline { message, note } => {
                log::info!(
                    "User declined tool '{}' with message: {}",
                    request.tool(),
                    message
                );
                let result =
                    ToolResult::declined(request.id().clone(), request.tool(), message);
                let record =
                    DecisionRecord::new(DecisionOutcome::Declined, Decider::Human).with_note(note);
                (result, record)
            }
            Decision::Edit { tool, args, note } => {
                let replacement = request.replacement(tool, args);
                log::info!(
                    "User edited tool '{}' -> '{}'",
                    request.tool(),
                    replacement.tool()
                );
                let result = self
                    .registry
                    .execute(session, &replacement)
                    .with_call_id(request.id().clone());
                trace(replacement.id(), replacement.tool(), CallPhase::Executed);
                let record = DecisionRecord::new(DecisionOutcome::Edited, Decider::Human)
                    .with_note(note)
                    .with_replacement(replacement);
                (result, record)
            }
        };

        session.record_call(CallRecord::new(
            request,
            Some(pending.risk),
            Some(record),
            result.clone(),
        ));
        result
    }

    fn reject(&self, session: &mut Session, reason: DecisionError) -> GateError {
        log::warn!("Session {}: invalid decision: {}", session.id(), reason);
        let resolved = match self.config.invalid_decision_mode {
            InvalidDecisionMode::Reprompt => None,
            InvalidDecisionMode::FailTurn => session.decline_pending(
                Decider::InvalidDecision,
                &format!("Invalid decision: {reason}"),
                None,
            ),
        };
        GateError::InvalidDecision { reason, resolved }
    }
}
