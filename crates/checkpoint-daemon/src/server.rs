//! Command dispatch for the stdio daemon.
//!
//! The daemon keeps every live session in a [`SessionManager`] and routes
//! each request to a `dispatch_*` handler. Handlers never panic on bad
//! input; everything comes back as a [`Response`] with an [`ErrorCode`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use checkpoint_core::event_bus::{EventBus, SessionEvent};
use checkpoint_core::gate::{Gate, GateError, GateOutcome};
use checkpoint_core::logging::{log_line, open_log_file, LogHandle};
use checkpoint_core::persistence::{self, SnapshotError};
use checkpoint_core::session::{Session, SessionError, SessionId, SessionManager};
use checkpoint_core::todos;
use checkpoint_core::tools::{builtin, ToolArgs, ToolCallRequest, ToolResult};
use checkpoint_core::vfs::FsError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::{ErrorBody, ErrorCode, Request, Response};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

impl DaemonError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DaemonError::BadRequest(_) => ErrorCode::BadRequest,
            DaemonError::Gate(GateError::NoPendingRequest) => ErrorCode::NoPendingRequest,
            DaemonError::Gate(GateError::InvalidDecision { .. }) => ErrorCode::InvalidDecision,
            DaemonError::Gate(GateError::Busy { .. }) => ErrorCode::Busy,
            DaemonError::Session(SessionError::NotFound(_)) => ErrorCode::SessionNotFound,
            DaemonError::Session(SessionError::AlreadyExists(_)) => ErrorCode::BadRequest,
            DaemonError::Snapshot(SnapshotError::NotFound(_)) => ErrorCode::SessionNotFound,
            DaemonError::Snapshot(SnapshotError::InvalidId(_)) => ErrorCode::BadRequest,
            DaemonError::Snapshot(_) => ErrorCode::Io,
            DaemonError::Fs(FsError::NotFound(_)) => ErrorCode::NotFound,
            DaemonError::Fs(_) => ErrorCode::BadRequest,
        }
    }

    fn body(&self) -> ErrorBody {
        let data = match self {
            DaemonError::Gate(GateError::InvalidDecision {
                resolved: Some(result),
                ..
            }) => Some(json!({ "resolved": result })),
            DaemonError::Gate(GateError::Busy { pending }) => Some(json!({ "pending": pending })),
            _ => None,
        };
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

type DispatchResult = Result<Value, DaemonError>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionArgs {
    session_id: SessionId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposeArgs {
    session_id: SessionId,
    tool: String,
    #[serde(default)]
    args: ToolArgs,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecideArgs {
    session_id: SessionId,
    decision: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadFileArgs {
    session_id: SessionId,
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeardownArgs {
    session_id: SessionId,
    #[serde(default)]
    delete_snapshot: bool,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, DaemonError> {
    serde_json::from_value(args).map_err(|e| DaemonError::BadRequest(format!("Invalid arguments: {e}")))
}

/// Session ids that reach the data directory must be plain file names.
fn file_safe(id: &SessionId) -> Result<(), DaemonError> {
    if id.is_file_safe() {
        Ok(())
    } else {
        Err(DaemonError::BadRequest(format!("Invalid session id: {id:?}")))
    }
}

fn outcome_json(outcome: &GateOutcome) -> Value {
    match outcome {
        GateOutcome::Executed(result) => json!({ "outcome": "executed", "result": result }),
        GateOutcome::AwaitingDecision(pending) => json!({
            "outcome": "awaitingDecision",
            "pending": pending,
            "prompt": pending.prompt(),
        }),
        GateOutcome::Queued { call_id, position } => json!({
            "outcome": "queued",
            "callId": call_id,
            "position": position,
        }),
    }
}

/// `TodosUpdated` for a successful `write_todos` call.
fn todos_event(session: &Session, result: &ToolResult) -> Option<SessionEvent> {
    if !result.is_success() || result.tool() != builtin::WRITE_TODOS {
        return None;
    }
    Some(SessionEvent::TodosUpdated {
        session_id: session.id().clone(),
        completed: todos::completed_count(session.todos()),
        total: session.todos().len(),
        summary: todos::progress_summary(session.todos()),
    })
}

pub struct Daemon {
    gate: Gate,
    manager: SessionManager,
    events: Arc<EventBus>,
    data_dir: PathBuf,
    transcripts: HashMap<SessionId, LogHandle>,
}

impl Daemon {
    pub fn new(gate: Gate, events: Arc<EventBus>, data_dir: PathBuf) -> Self {
        Self {
            gate,
            manager: SessionManager::new(),
            events,
            data_dir,
            transcripts: HashMap::new(),
        }
    }

    /// Parse and handle one input line.
    pub fn handle_line(&mut self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                log::warn!("Unparseable request: {}", e);
                Response::err(
                    None,
                    ErrorBody {
                        code: ErrorCode::BadRequest,
                        message: format!("Invalid request: {e}"),
                        data: None,
                    },
                )
            }
        }
    }

    pub fn handle(&mut self, request: Request) -> Response {
        log::debug!("Command: {} with args: {}", request.command, request.args);
        let Request { id, command, args } = request;

        let result = match command.as_str() {
            "createSession" => self.dispatch_create_session(),
            "listSessions" => self.dispatch_list_sessions(),
            "propose" => self.dispatch_propose(args),
            "pending" => self.dispatch_pending(args),
            "decide" => self.dispatch_decide(args),
            "listFiles" => self.dispatch_list_files(args),
            "readFile" => self.dispatch_read_file(args),
            "history" => self.dispatch_history(args),
            "save" => self.dispatch_save(args),
            "restore" => self.dispatch_restore(args),
            "teardown" => self.dispatch_teardown(args),
            _ => Err(DaemonError::BadRequest(format!("Unknown command: {command}"))),
        };

        match result {
            Ok(data) => Response::ok(id, data),
            Err(err) => {
                log::warn!("Command {} failed: {}", command, err);
                Response::err(id, err.body())
            }
        }
    }

    /// Tear down every live session. Undecided calls are cancelled.
    pub fn shutdown(&mut self) {
        for id in self.manager.list_sessions() {
            if let Ok((_, cancelled)) = self.manager.teardown_session(&id) {
                self.events.emit(SessionEvent::SessionEnded {
                    session_id: id,
                    cancelled: cancelled.len(),
                });
            }
        }
    }

    /// Decline every pending call that has outlived the approval timeout,
    /// then admit whatever was queued behind it.
    pub fn expire_overdue(&mut self) {
        for id in self.manager.list_sessions() {
            let Some(session) = self.manager.get_session_mut(&id) else {
                continue;
            };
            let Some(result) = self.gate.expire_overdue(session) else {
                continue;
            };
            let next = self.gate.resume_queued(session);
            self.events.emit(SessionEvent::ToolCompleted {
                session_id: id.clone(),
                result,
            });
            if let Some(outcome) = &next {
                self.publish(&id, outcome);
            }
        }
    }

    fn open_transcript(&mut self, id: &SessionId) {
        let handle = open_log_file(self.gate.config().log_dir.as_deref(), &id.0);
        self.transcripts.insert(id.clone(), handle);
    }

    /// Transcript of a live session; an empty handle when there is none.
    fn transcript(&self, id: &SessionId) -> LogHandle {
        self.transcripts.get(id).cloned().unwrap_or_default()
    }

    fn publish(&self, session_id: &SessionId, outcome: &GateOutcome) {
        let event = match outcome {
            GateOutcome::Executed(result) => SessionEvent::ToolCompleted {
                session_id: session_id.clone(),
                result: result.clone(),
            },
            GateOutcome::AwaitingDecision(pending) => SessionEvent::ApprovalRequested {
                session_id: session_id.clone(),
                prompt: pending.prompt(),
                pending: pending.clone(),
            },
            GateOutcome::Queued { call_id, position } => SessionEvent::CallQueued {
                session_id: session_id.clone(),
                call_id: call_id.clone(),
                position: *position,
            },
        };
        self.events.emit(event);
    }

    // ========================================================================
    // SESSION LIFECYCLE
    // ========================================================================

    fn dispatch_create_session(&mut self) -> DispatchResult {
        let id = self.manager.create_session();
        self.open_transcript(&id);
        Ok(json!({ "sessionId": id }))
    }

    fn dispatch_list_sessions(&self) -> DispatchResult {
        let saved = persistence::list_snapshot_ids(&self.data_dir)?;
        Ok(json!({ "live": self.manager.list_sessions(), "saved": saved }))
    }

    fn dispatch_save(&mut self, args: Value) -> DispatchResult {
        let SessionArgs { session_id } = parse_args(args)?;
        let session = self.manager.session_mut(&session_id)?;
        let path = persistence::save_snapshot(&self.data_dir, session)?;
        Ok(json!({ "path": path }))
    }

    fn dispatch_restore(&mut self, args: Value) -> DispatchResult {
        let SessionArgs { session_id } = parse_args(args)?;
        file_safe(&session_id)?;
        let session = persistence::load_snapshot(&self.data_dir, &session_id)?;
        let pending = session.pending_approval().cloned();
        let id = self.manager.insert_session(session)?;
        self.open_transcript(&id);
        log::info!("Restored session {}", id);
        if let Some(pending) = &pending {
            self.publish(&id, &GateOutcome::AwaitingDecision(pending.clone()));
        }
        Ok(json!({ "sessionId": id, "pending": pending }))
    }

    fn dispatch_teardown(&mut self, args: Value) -> DispatchResult {
        let TeardownArgs {
            session_id,
            delete_snapshot,
        } = parse_args(args)?;
        if delete_snapshot {
            file_safe(&session_id)?;
        }
        let (_, cancelled) = self.manager.teardown_session(&session_id)?;
        self.transcripts.remove(&session_id);
        self.events.emit(SessionEvent::SessionEnded {
            session_id: session_id.clone(),
            cancelled: cancelled.len(),
        });

        // The session is gone either way; a failed delete is reported, not raised.
        let snapshot_error = if delete_snapshot {
            persistence::delete_snapshot(&self.data_dir, &session_id)
                .err()
                .map(|e| {
                    log::warn!("Failed to delete snapshot of {}: {}", session_id, e);
                    e.to_string()
                })
        } else {
            None
        };
        Ok(match snapshot_error {
            Some(message) => json!({ "cancelled": cancelled, "snapshotError": message }),
            None => json!({ "cancelled": cancelled }),
        })
    }

    // ========================================================================
    // GATE
    // ========================================================================

    fn dispatch_propose(&mut self, args: Value) -> DispatchResult {
        let ProposeArgs {
            session_id,
            tool,
            args,
        } = parse_args(args)?;
        let transcript = self.transcript(&session_id);
        let session = self.manager.session_mut(&session_id)?;
        let turn = session.begin_turn();
        let request = ToolCallRequest::new(tool, args, turn);
        log_line(
            &transcript,
            "PROPOSE",
            &format!("{} {}", request.tool(), Value::Object(request.args().clone())),
        );
        let outcome = self.gate.propose(session, request)?;
        if let GateOutcome::Executed(result) = &outcome {
            log_line(&transcript, "RESULT", &result.content());
            if let Some(event) = todos_event(session, result) {
                self.events.emit(event);
            }
        }
        self.publish(&session_id, &outcome);
        Ok(outcome_json(&outcome))
    }

    fn dispatch_pending(&mut self, args: Value) -> DispatchResult {
        let SessionArgs { session_id } = parse_args(args)?;
        let session = self.manager.session_mut(&session_id)?;
        Ok(match self.gate.pending(session) {
            Some(pending) => json!({
                "pending": pending,
                "prompt": pending.prompt(),
                "queued": session.queued().count(),
            }),
            None => json!({ "pending": null, "queued": session.queued().count() }),
        })
    }

    fn dispatch_decide(&mut self, args: Value) -> DispatchResult {
        let DecideArgs {
            session_id,
            decision,
        } = parse_args(args)?;
        let transcript = self.transcript(&session_id);
        let session = self.manager.session_mut(&session_id)?;
        log_line(&transcript, "DECISION", &decision.to_string());
        let pending_call = session.pending_approval().map(|p| p.request.id().clone());

        let result = match self.gate.decide_json(session, &decision.to_string()) {
            Ok(result) => result,
            Err(err) => {
                if let (
                    GateError::InvalidDecision {
                        reason,
                        resolved: None,
                    },
                    Some(call_id),
                ) = (&err, pending_call)
                {
                    log_line(&transcript, "INVALID", &reason.to_string());
                    self.events.emit(SessionEvent::DecisionRejected {
                        session_id: session_id.clone(),
                        call_id,
                        reason: reason.to_string(),
                    });
                }
                return Err(err.into());
            }
        };

        log_line(&transcript, "RESULT", &result.content());
        let todos_update = todos_event(session, &result);
        let next = self.gate.resume_queued(session);
        self.events.emit(SessionEvent::ToolCompleted {
            session_id: session_id.clone(),
            result: result.clone(),
        });
        if let Some(event) = todos_update {
            self.events.emit(event);
        }
        if let Some(outcome) = &next {
            self.publish(&session_id, outcome);
        }
        Ok(json!({
            "result": result,
            "next": next.as_ref().map(outcome_json),
        }))
    }

    // ========================================================================
    // STORE AND HISTORY
    // ========================================================================

    fn dispatch_list_files(&mut self, args: Value) -> DispatchResult {
        let SessionArgs { session_id } = parse_args(args)?;
        let session = self.manager.session_mut(&session_id)?;
        let files: Vec<_> = session.list_files().collect();
        Ok(json!({ "files": files }))
    }

    fn dispatch_read_file(&mut self, args: Value) -> DispatchResult {
        let ReadFileArgs { session_id, path } = parse_args(args)?;
        let session = self.manager.session_mut(&session_id)?;
        let content = session.read_file(&path)?;
        let version = session.files().get(&path).map(|e| e.version);
        Ok(json!({ "path": path, "content": content, "version": version }))
    }

    fn dispatch_history(&mut self, args: Value) -> DispatchResult {
        let SessionArgs { session_id } = parse_args(args)?;
        let session = self.manager.session_mut(&session_id)?;
        Ok(json!({ "history": session.history(), "todos": session.todos() }))
    }
}
