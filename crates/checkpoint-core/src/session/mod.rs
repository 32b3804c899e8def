//! Sessions: per-run state, its audit trail, and the drivers around it.
//!
//! A [`Session`] owns the virtual filesystem, the pending call and the
//! history. Nothing is shared between sessions.

mod history;
mod manager;
mod runner;
mod state;

pub use history::{CallRecord, Decider, DecisionOutcome, DecisionRecord, HistoryEntry};
pub use manager::{SessionError, SessionManager};
pub use runner::{Observation, Planner, RunEnd, RunSummary, SessionRunner};
pub use state::{Session, SessionId, TurnId};
