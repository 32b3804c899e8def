//! Session-scoped virtual filesystem.
//!
//! The store is a flat mapping from path to content used to offload large
//! intermediate results out of the model's working context. Paths are opaque
//! identifiers: there are no directories and no normalization, so
//! `notes.md` and `./notes.md` are two different files.

mod store;

pub use store::{FileEntry, FileInfo, FileStore, Listing};

use thiserror::Error;

/// Errors returned by store operations.
///
/// All of these are recoverable: the gate turns them into tool-error results
/// that the planner can react to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("String not found in {path}: {needle:?}")]
    NoMatch { path: String, needle: String },

    #[error("String occurs {count} times in {path}; pass replace_all to replace every occurrence")]
    AmbiguousMatch { path: String, count: usize },
}
