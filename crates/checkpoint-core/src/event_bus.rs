//! Framework-agnostic session event broadcasting.
//!
//! The EventBus distributes [`SessionEvent`]s to every human-facing front end
//! (a terminal prompt, the stdio daemon, a test harness) from a single
//! source.
//!
//! # Example
//!
//! ```rust
//! use checkpoint_core::event_bus::{EventBus, SessionEvent};
//! use checkpoint_core::session::SessionId;
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.emit(SessionEvent::SessionEnded {
//!     session_id: SessionId::new(),
//!     cancelled: 0,
//! });
//!
//! // In async context:
//! // let event = rx.recv().await.unwrap();
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::gate::PendingApproval;
use crate::session::SessionId;
use crate::tools::{ToolCallId, ToolResult};

/// Default channel capacity for the event bus.
/// Events beyond this capacity will cause slow subscribers to miss events (lag).
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A call is waiting for a human. `prompt` is the text to show.
    #[serde(rename_all = "camelCase")]
    ApprovalRequested {
        session_id: SessionId,
        pending: PendingApproval,
        prompt: String,
    },

    /// The human's decision was invalid and the call is still pending.
    #[serde(rename_all = "camelCase")]
    DecisionRejected {
        session_id: SessionId,
        call_id: ToolCallId,
        reason: String,
    },

    #[serde(rename_all = "camelCase")]
    CallQueued {
        session_id: SessionId,
        call_id: ToolCallId,
        position: usize,
    },

    #[serde(rename_all = "camelCase")]
    ToolCompleted {
        session_id: SessionId,
        result: ToolResult,
    },

    #[serde(rename_all = "camelCase")]
    TodosUpdated {
        session_id: SessionId,
        completed: usize,
        total: usize,
        summary: String,
    },

    /// `cancelled` counts undecided calls discarded at teardown.
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        session_id: SessionId,
        cancelled: usize,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::ApprovalRequested { session_id, .. }
            | SessionEvent::DecisionRejected { session_id, .. }
            | SessionEvent::CallQueued { session_id, .. }
            | SessionEvent::ToolCompleted { session_id, .. }
            | SessionEvent::TodosUpdated { session_id, .. }
            | SessionEvent::SessionEnded { session_id, .. } => session_id,
        }
    }
}

/// Broadcast channel for session events.
///
/// Uses a tokio broadcast channel internally, allowing multiple consumers to
/// receive the same events concurrently.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// The capacity determines how many events can be buffered before slow
    /// subscribers start missing events (experiencing lag).
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// If there are no subscribers, the event is dropped and 0 is returned.
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Past events are not delivered to new subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
