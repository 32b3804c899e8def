//! # checkpoint-core
//!
//! A session-scoped virtual filesystem and a human-in-the-loop gate for
//! agent tool calls.
//!
//! This crate is framework-agnostic and can be used by:
//! - The stdio daemon (via JSON lines)
//! - An in-process agent loop (via [`session::SessionRunner`])
//!
//! ## Key Concepts
//!
//! - **Session**: one agent run with its own files, pending call and history
//! - **Gate**: classifies every proposed call and either runs it or waits
//!   for a human to accept, decline or edit it
//! - **Tool registry**: the explicit set of tools a session may call

pub mod approval;
pub mod config;
pub mod event_bus;
pub mod gate;
pub mod logging;
pub mod paths;
pub mod persistence;
pub mod session;
pub mod todos;
pub mod tools;
pub mod vfs;

// Re-export commonly used types
pub use approval::{ApprovalPolicy, DecisionPayload, RiskLevel};
pub use config::GateConfig;
pub use gate::{Gate, GateError, GateOutcome};
pub use session::{Session, SessionId, SessionManager};
pub use tools::{ToolCallRequest, ToolRegistry, ToolResult};
pub use vfs::{FileStore, FsError};
