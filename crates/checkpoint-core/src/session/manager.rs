//! SessionManager - owns every live session of a process.

use std::collections::HashMap;

use thiserror::Error;

use super::state::{Session, SessionId};
use crate::tools::ToolResult;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),
}

/// Live sessions keyed by id. Sessions share nothing with each other.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session, returns ID for future reference.
    pub fn create_session(&mut self) -> SessionId {
        let session = Session::new();
        let id = session.id().clone();
        log::info!("Created session {}", id);
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Adopt an existing session (e.g. one restored from a snapshot).
    pub fn insert_session(&mut self, session: Session) -> Result<SessionId, SessionError> {
        let id = session.id().clone();
        if self.sessions.contains_key(&id) {
            return Err(SessionError::AlreadyExists(id));
        }
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    pub fn get_session(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn get_session_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    /// Like [`SessionManager::get_session_mut`], but a missing session is an
    /// error.
    pub fn session_mut(&mut self, session_id: &SessionId) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))
    }

    /// End a session. Undecided calls are declined by cancellation and
    /// never run; their results are returned alongside the final state.
    pub fn teardown_session(
        &mut self,
        session_id: &SessionId,
    ) -> Result<(Session, Vec<ToolResult>), SessionError> {
        let mut session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;
        let cancelled = session.cancel();
        log::info!("Tore down session {}", session_id);
        Ok((session, cancelled))
    }

    /// List all active session IDs, sorted.
    pub fn list_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalPolicy;
    use crate::gate::Gate;
    use crate::session::{Decider, DecisionOutcome};
    use crate::tools::{ToolCallId, ToolCallRequest, ToolRegistry};
    use serde_json::json;
    use std::sync::Arc;

    mod session_manager {
        use super::*;

        #[test]
        fn new_creates_empty_manager() {
            let manager = SessionManager::new();
            assert!(manager.list_sessions().is_empty());
            assert!(manager.is_empty());
        }

        #[test]
        fn create_session_returns_unique_ids() {
            let mut manager = SessionManager::new();
            let id1 = manager.create_session();
            let id2 = manager.create_session();
            assert_ne!(id1, id2);
            assert_eq!(manager.len(), 2);
        }

        #[test]
        fn get_session_returns_existing() {
            let mut manager = SessionManager::new();
            let id = manager.create_session();
            assert_eq!(manager.get_session(&id).unwrap().id(), &id);
        }

        #[test]
        fn get_session_returns_none_for_nonexistent() {
            let manager = SessionManager::new();
            assert!(manager
                .get_session(&SessionId("nonexistent".to_string()))
                .is_none());
        }

        #[test]
        fn sessions_are_isolated() {
            let mut manager = SessionManager::new();
            let a = manager.create_session();
            let b = manager.create_session();

            manager.session_mut(&a).unwrap().write_file(
                "notes.md",
                "only in a",
                "write_file",
                &ToolCallId::new(),
            );

            assert!(manager.get_session(&a).unwrap().files().contains("notes.md"));
            assert!(manager.get_session(&b).unwrap().files().is_empty());
        }

        #[test]
        fn session_mut_errors_for_nonexistent() {
            let mut manager = SessionManager::new();
            let fake_id = SessionId("nonexistent".to_string());
            assert_eq!(
                manager.session_mut(&fake_id).unwrap_err(),
                SessionError::NotFound(fake_id)
            );
        }

        #[test]
        fn insert_rejects_duplicates() {
            let mut manager = SessionManager::new();
            let session = Session::with_id(SessionId("restored".to_string()));
            manager.insert_session(session.clone()).unwrap();
            assert_eq!(
                manager.insert_session(session).unwrap_err(),
                SessionError::AlreadyExists(SessionId("restored".to_string()))
            );
        }

        #[test]
        fn list_sessions_is_sorted() {
            let mut manager = SessionManager::new();
            for name in ["c", "a", "b"] {
                manager
                    .insert_session(Session::with_id(SessionId(name.to_string())))
                    .unwrap();
            }
            let names: Vec<String> = manager.list_sessions().into_iter().map(|id| id.0).collect();
            assert_eq!(names, vec!["a", "b", "c"]);
        }
    }

    mod teardown {
        use super::*;

        #[test]
        fn teardown_removes_session() {
            let mut manager = SessionManager::new();
            let id = manager.create_session();
            let (session, cancelled) = manager.teardown_session(&id).unwrap();
            assert_eq!(session.id(), &id);
            assert!(cancelled.is_empty());
            assert!(manager.get_session(&id).is_none());
        }

        #[test]
        fn teardown_cancels_pending_call() {
            let gate = Gate::new(
                Arc::new(ToolRegistry::with_builtin_tools()),
                ApprovalPolicy::new(),
            );
            let mut manager = SessionManager::new();
            let id = manager.create_session();
            {
                let session = manager.session_mut(&id).unwrap();
                session.write_file("notes.md", "draft", "write_file", &ToolCallId::new());
                let request = ToolCallRequest::from_value(
                    "delete_file",
                    json!({"path": "notes.md"}),
                    session.begin_turn(),
                );
                gate.propose(session, request).unwrap();
            }

            let (session, cancelled) = manager.teardown_session(&id).unwrap();

            assert_eq!(cancelled.len(), 1);
            assert!(session.files().contains("notes.md"));
            let decision = session.calls().last().unwrap().decision.clone().unwrap();
            assert_eq!(decision.outcome, DecisionOutcome::Declined);
            assert_eq!(decision.decided_by, Decider::Cancellation);
        }

        #[test]
        fn teardown_unknown_session_is_not_found() {
            let mut manager = SessionManager::new();
            let fake_id = SessionId("gone".to_string());
            assert_eq!(
                manager.teardown_session(&fake_id).unwrap_err(),
                SessionError::NotFound(fake_id)
            );
        }
    }

    mod session_error {
        use super::*;

        #[test]
        fn not_found_displays_session_id() {
            let error = SessionError::NotFound(SessionId("test-123".to_string()));
            assert!(error.to_string().contains("test-123"));
        }

        #[test]
        fn already_exists_displays_session_id() {
            let error = SessionError::AlreadyExists(SessionId("existing-456".to_string()));
            assert!(error.to_string().contains("existing-456"));
        }
    }
}
