//! Async driver for one session: planner -> gate -> human -> planner.
//!
//! The runner is strictly turn-taking. It asks the planner for one call,
//! routes it through the gate, and if the gate suspends it, waits for a
//! decision on an mpsc channel before asking the planner again. Waiting for
//! a decision is the only suspension point.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::history::Decider;
use super::state::Session;
use crate::approval::DecisionPayload;
use crate::event_bus::{EventBus, SessionEvent};
use crate::gate::{Gate, GateError, GateOutcome};
use crate::logging::{log_line, open_log_file, LogHandle};
use crate::todos::{self, Todo};
use crate::tools::{ToolCallRequest, ToolResult};
use crate::vfs::FileInfo;

/// Source of proposed tool calls, typically a language model.
pub trait Planner {
    /// Next call to make, or `None` when the task is done.
    fn next_call(&mut self, session: &Session) -> Option<ToolCallRequest>;

    /// Result of the previous call together with the current store view.
    fn observe(&mut self, observation: &Observation);
}

/// What the planner sees after each call.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub result: ToolResult,
    /// Store listing, ordered by path.
    pub files: Vec<FileInfo>,
    /// The same store as one line per file, ready for a prompt.
    pub store_summary: String,
    /// Todo progress report, when the session has todos.
    pub progress: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The planner had nothing more to propose.
    PlannerFinished,
    /// The decision channel closed while a call was pending.
    DecisionsClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ended_by: RunEnd,
    /// Results fed back to the planner.
    pub completed: usize,
    pub declined: usize,
    /// Undecided calls discarded when the run ended.
    pub cancelled: usize,
}

enum Wait {
    Resolved(ToolResult),
    Closed,
}

pub struct SessionRunner {
    gate: Arc<Gate>,
    events: Arc<EventBus>,
}

impl SessionRunner {
    pub fn new(gate: Arc<Gate>, events: Arc<EventBus>) -> Self {
        Self { gate, events }
    }

    /// Drive `session` until the planner finishes or the decision channel
    /// closes. A session restored with a pending call waits for that
    /// decision first.
    pub async fn run<P: Planner>(
        &self,
        session: &mut Session,
        planner: &mut P,
        decisions: &mut mpsc::Receiver<DecisionPayload>,
    ) -> RunSummary {
        let transcript = open_log_file(self.gate.config().log_dir.as_deref(), &session.id().0);
        let mut last_todos = session.todos().to_vec();
        let mut completed = 0;
        let mut declined = 0;

        let ended_by = loop {
            if session.pending_approval().is_some() {
                match self.await_decision(session, decisions, &transcript).await {
                    Wait::Resolved(result) => {
                        completed += 1;
                        declined += usize::from(result.is_declined());
                        self.feed(session, planner, result, &mut last_todos, &transcript);
                        continue;
                    }
                    Wait::Closed => break RunEnd::DecisionsClosed,
                }
            }

            let outcome = match self.gate.resume_queued(session) {
                Some(outcome) => outcome,
                None => {
                    session.begin_turn();
                    let Some(request) = planner.next_call(session) else {
                        break RunEnd::PlannerFinished;
                    };
                    log_line(
                        &transcript,
                        "PROPOSE",
                        &format!(
                            "{} {}",
                            request.tool(),
                            serde_json::Value::Object(request.args().clone())
                        ),
                    );
                    match self.gate.propose(session, request) {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            log::warn!("Session {}: {}", session.id(), err);
                            continue;
                        }
                    }
                }
            };

            match outcome {
                GateOutcome::Executed(result) => {
                    completed += 1;
                    self.feed(session, planner, result, &mut last_todos, &transcript);
                }
                GateOutcome::AwaitingDecision(_) => {}
                GateOutcome::Queued { call_id, position } => {
                    self.events.emit(SessionEvent::CallQueued {
                        session_id: session.id().clone(),
                        call_id,
                        position,
                    });
                }
            }
        };

        let cancelled = session.cancel().len();
        log_line(
            &transcript,
            "END",
            &format!("{:?} ({} cancelled)", ended_by, cancelled),
        );
        self.events.emit(SessionEvent::SessionEnded {
            session_id: session.id().clone(),
            cancelled,
        });
        log::info!(
            "Session {} finished: {:?}, {} call(s), {} declined, {} cancelled",
            session.id(),
            ended_by,
            completed,
            declined,
            cancelled
        );

        RunSummary {
            ended_by,
            completed,
            declined,
            cancelled,
        }
    }

    async fn await_decision(
        &self,
        session: &mut Session,
        decisions: &mut mpsc::Receiver<DecisionPayload>,
        transcript: &LogHandle,
    ) -> Wait {
        // One deadline per call, counted from when it was parked. Rejected
        // decisions and restores do not extend it.
        let deadline = session
            .pending_approval()
            .zip(self.gate.config().approval_timeout())
            .map(|(pending, limit)| Instant::now() + pending.remaining(limit));

        loop {
            let Some(pending) = session.pending_approval().cloned() else {
                return Wait::Closed;
            };
            self.events.emit(SessionEvent::ApprovalRequested {
                session_id: session.id().clone(),
                prompt: pending.prompt(),
                pending: pending.clone(),
            });

            let received = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, decisions.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        log_line(transcript, "TIMEOUT", &pending.request.id().0);
                        return self
                            .gate
                            .expire(session, Decider::Timeout)
                            .map_or(Wait::Closed, Wait::Resolved);
                    }
                },
                None => decisions.recv().await,
            };

            let Some(payload) = received else {
                log::info!(
                    "Session {}: decision channel closed with call {} pending",
                    session.id(),
                    pending.request.id()
                );
                return Wait::Closed;
            };
            log_line(
                transcript,
                "DECIDE",
                &serde_json::to_string(&payload).unwrap_or_default(),
            );

            match self.gate.decide(session, payload) {
                Ok(result) => return Wait::Resolved(result),
                Err(GateError::InvalidDecision {
                    reason,
                    resolved: Some(result),
                }) => {
                    log_line(transcript, "INVALID", &reason.to_string());
                    return Wait::Resolved(result);
                }
                Err(GateError::InvalidDecision {
                    reason,
                    resolved: None,
                }) => {
                    log_line(transcript, "INVALID", &reason.to_string());
                    self.events.emit(SessionEvent::DecisionRejected {
                        session_id: session.id().clone(),
                        call_id: pending.request.id().clone(),
                        reason: reason.to_string(),
                    });
                }
                Err(err) => {
                    log::warn!("Session {}: {}", session.id(), err);
                    return Wait::Closed;
                }
            }
        }
    }

    fn feed<P: Planner>(
        &self,
        session: &Session,
        planner: &mut P,
        result: ToolResult,
        last_todos: &mut Vec<Todo>,
        transcript: &LogHandle,
    ) {
        log_line(transcript, "RESULT", &result.content());
        self.events.emit(SessionEvent::ToolCompleted {
            session_id: session.id().clone(),
            result: result.clone(),
        });

        let progress = if session.todos().is_empty() {
            None
        } else {
            Some(todos::progress_summary(session.todos()))
        };
        if !todos::same_progress(last_todos, session.todos()) {
            *last_todos = session.todos().to_vec();
            self.events.emit(SessionEvent::TodosUpdated {
                session_id: session.id().clone(),
                completed: todos::completed_count(session.todos()),
                total: session.todos().len(),
                summary: progress.clone().unwrap_or_default(),
            });
        }

        planner.observe(&Observation {
            result,
            files: session.list_files().collect(),
            store_summary: session.files().summary(),
            progress,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalPolicy, RiskLevel};
    use crate::config::{GateConfig, InvalidDecisionMode};
    use crate::session::{DecisionOutcome, HistoryEntry};
    use crate::tools::{builtin, ToolRegistry};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// Proposes a fixed list of calls and remembers what it observed.
    #[derive(Default)]
    struct Scripted {
        calls: VecDeque<(&'static str, Value)>,
        observed: Vec<Observation>,
    }

    impl Scripted {
        fn new(calls: Vec<(&'static str, Value)>) -> Self {
            Self {
                calls: calls.into(),
                observed: Vec::new(),
            }
        }
    }

    impl Planner for Scripted {
        fn next_call(&mut self, session: &Session) -> Option<ToolCallRequest> {
            let (tool, args) = self.calls.pop_front()?;
            Some(ToolCallRequest::from_value(
                tool,
                args,
                session.current_turn().clone(),
            ))
        }

        fn observe(&mut self, observation: &Observation) {
            self.observed.push(observation.clone());
        }
    }

    fn runner(config: GateConfig) -> (SessionRunner, Arc<EventBus>) {
        let gate = Gate::with_config(
            Arc::new(ToolRegistry::with_builtin_tools()),
            ApprovalPolicy::new().with_tool(builtin::WRITE_FILE, RiskLevel::Auto),
            config,
        );
        let events = Arc::new(EventBus::new());
        (SessionRunner::new(Arc::new(gate), events.clone()), events)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn auto_calls_run_without_decisions() {
        let (runner, _events) = runner(GateConfig::default());
        let mut session = Session::new();
        let mut planner = Scripted::new(vec![
            (builtin::WRITE_FILE, json!({"path": "out.json", "content": "{}"})),
            (builtin::LS, json!({})),
        ]);
        let (_tx, mut rx) = mpsc::channel(1);

        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.ended_by, RunEnd::PlannerFinished);
        assert_eq!(summary.completed, 2);
        assert_eq!(planner.observed.len(), 2);
        assert_eq!(planner.observed[1].files.len(), 1);
        assert_eq!(planner.observed[1].files[0].path, "out.json");
        assert_eq!(planner.observed[1].store_summary, "out.json (2 bytes, v1)");
    }

    #[tokio::test]
    async fn decline_scenario_end_to_end() {
        let (runner, events) = runner(GateConfig::default());
        let mut events_rx = events.subscribe();
        let mut session = Session::new();
        let mut planner = Scripted::new(vec![
            (builtin::WRITE_FILE, json!({"path": "notes.md", "content": "draft v1"})),
            (builtin::DELETE_FILE, json!({"path": "notes.md"})),
        ]);
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(DecisionPayload::decline("keep the draft"))
            .await
            .unwrap();

        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.ended_by, RunEnd::PlannerFinished);
        assert_eq!(summary.declined, 1);
        assert_eq!(session.read_file("notes.md").unwrap(), "draft v1");
        let last = planner.observed.last().unwrap();
        assert!(last.result.is_declined());
        assert_eq!(last.result.content(), "Declined: keep the draft");

        let events = drain(&mut events_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::ApprovalRequested { prompt, .. } if prompt.contains("Tool: delete_file")
        )));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SessionEnded { cancelled: 0, .. })
        ));
    }

    #[tokio::test]
    async fn invalid_decision_reprompts_then_accepts() {
        let (runner, events) = runner(GateConfig::default());
        let mut events_rx = events.subscribe();
        let mut session = Session::new();
        session.write_file("notes.md", "draft", "write_file", &Default::default());
        let mut planner = Scripted::new(vec![(builtin::DELETE_FILE, json!({"path": "notes.md"}))]);
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(DecisionPayload::edit(None, None)).await.unwrap();
        tx.send(DecisionPayload::accept()).await.unwrap();

        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.completed, 1);
        assert!(!session.files().contains("notes.md"));
        let events = drain(&mut events_rx);
        let rejected = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::DecisionRejected { .. }))
            .count();
        let prompts = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ApprovalRequested { .. }))
            .count();
        assert_eq!(rejected, 1);
        assert_eq!(prompts, 2);
    }

    #[tokio::test]
    async fn invalid_decision_fails_turn_when_configured() {
        let (runner, _events) = runner(GateConfig {
            invalid_decision_mode: InvalidDecisionMode::FailTurn,
            ..GateConfig::default()
        });
        let mut session = Session::new();
        let mut planner = Scripted::new(vec![(builtin::DELETE_FILE, json!({"path": "x"}))]);
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(DecisionPayload::edit(None, None)).await.unwrap();

        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.declined, 1);
        assert!(planner.observed[0].result.is_declined());
    }

    #[tokio::test]
    async fn closed_channel_cancels_pending_call() {
        let (runner, _events) = runner(GateConfig::default());
        let mut session = Session::new();
        session.write_file("notes.md", "draft", "write_file", &Default::default());
        let mut planner = Scripted::new(vec![
            (builtin::DELETE_FILE, json!({"path": "notes.md"})),
            (builtin::LS, json!({})),
        ]);
        let (tx, mut rx) = mpsc::channel::<DecisionPayload>(1);
        drop(tx);

        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.ended_by, RunEnd::DecisionsClosed);
        assert_eq!(summary.cancelled, 1);
        assert!(session.files().contains("notes.md"));
        assert!(session.pending_approval().is_none());
        let decision = session.calls().last().unwrap().decision.clone().unwrap();
        assert_eq!(decision.decided_by, Decider::Cancellation);
        // The planner never got to propose its second call.
        assert_eq!(planner.calls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missed_deadline_declines_with_timeout() {
        let (runner, _events) = runner(GateConfig {
            approval_timeout_secs: Some(30),
            ..GateConfig::default()
        });
        let mut session = Session::new();
        session.write_file("notes.md", "draft", "write_file", &Default::default());
        let mut planner = Scripted::new(vec![(builtin::DELETE_FILE, json!({"path": "notes.md"}))]);
        let (_tx, mut rx) = mpsc::channel::<DecisionPayload>(1);

        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.ended_by, RunEnd::PlannerFinished);
        assert_eq!(summary.declined, 1);
        assert!(session.files().contains("notes.md"));
        let decision = session.calls().last().unwrap().decision.clone().unwrap();
        assert_eq!(decision.outcome, DecisionOutcome::Declined);
        assert_eq!(decision.decided_by, Decider::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_decision_does_not_extend_deadline() {
        let (runner, _events) = runner(GateConfig {
            approval_timeout_secs: Some(30),
            ..GateConfig::default()
        });
        let mut session = Session::new();
        session.write_file("notes.md", "draft", "write_file", &Default::default());
        let mut planner = Scripted::new(vec![(builtin::DELETE_FILE, json!({"path": "notes.md"}))]);
        let (tx, mut rx) = mpsc::channel::<DecisionPayload>(1);
        let late = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            late.send(DecisionPayload::edit(None, None)).await.unwrap();
        });

        let start = Instant::now();
        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.declined, 1);
        assert!(start.elapsed() < Duration::from_secs(31));
        let decision = session.calls().last().unwrap().decision.clone().unwrap();
        assert_eq!(decision.decided_by, Decider::Timeout);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_overdue_call_expires_at_once() {
        let (runner, _events) = runner(GateConfig {
            approval_timeout_secs: Some(30),
            ..GateConfig::default()
        });
        let gate = Gate::new(
            Arc::new(ToolRegistry::with_builtin_tools()),
            ApprovalPolicy::new(),
        );
        let mut session = Session::new();
        session.write_file("notes.md", "draft", "write_file", &Default::default());
        let request = ToolCallRequest::from_value(
            builtin::DELETE_FILE,
            json!({"path": "notes.md"}),
            session.current_turn().clone(),
        );
        gate.propose(&mut session, request).unwrap();
        if let Some(pending) = session.pending_approval.as_mut() {
            pending.requested_at = chrono::Utc::now() - chrono::Duration::seconds(60);
        }

        let mut planner = Scripted::new(Vec::new());
        let (_tx, mut rx) = mpsc::channel::<DecisionPayload>(1);
        let start = Instant::now();
        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.declined, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(session.files().contains("notes.md"));
    }

    #[tokio::test]
    async fn restored_pending_call_is_decided_first() {
        let (runner, _events) = runner(GateConfig::default());
        let gate = Gate::new(
            Arc::new(ToolRegistry::with_builtin_tools()),
            ApprovalPolicy::new(),
        );
        let mut session = Session::new();
        session.write_file("notes.md", "draft", "write_file", &Default::default());
        let request = ToolCallRequest::from_value(
            builtin::DELETE_FILE,
            json!({"path": "notes.md"}),
            session.current_turn().clone(),
        );
        gate.propose(&mut session, request.clone()).unwrap();

        let mut planner = Scripted::new(Vec::new());
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(DecisionPayload::accept()).await.unwrap();

        let summary = runner.run(&mut session, &mut planner, &mut rx).await;

        assert_eq!(summary.completed, 1);
        assert_eq!(planner.observed[0].result.call_id(), request.id());
        assert!(!session.files().contains("notes.md"));
    }

    #[tokio::test]
    async fn todo_changes_are_reported() {
        let (runner, events) = runner(GateConfig::default());
        let mut events_rx = events.subscribe();
        let mut session = Session::new();
        let todos = json!({"todos": [
            {"content": "Gather sources", "status": "completed"},
            {"content": "Write report", "status": "in_progress"}
        ]});
        let mut planner = Scripted::new(vec![
            (builtin::WRITE_TODOS, todos.clone()),
            (builtin::WRITE_TODOS, todos),
        ]);
        let (_tx, mut rx) = mpsc::channel(1);

        runner.run(&mut session, &mut planner, &mut rx).await;

        let progress = planner.observed[0].progress.as_deref().unwrap();
        assert!(progress.starts_with("Progress: 1/2 tasks complete"));
        // Rewriting the same list does not report again.
        let updates: Vec<_> = drain(&mut events_rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::TodosUpdated { .. }))
            .collect();
        assert_eq!(updates.len(), 1);
        assert!(session
            .history()
            .iter()
            .any(|e| matches!(e, HistoryEntry::TodosUpdated { total: 2, completed: 1, .. })));
    }
}
