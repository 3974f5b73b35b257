use std::path::PathBuf;

use thiserror::Error;

/// Error types for state store operations.
///
/// An absent store is not an error: `StateStore::load` reports it as
/// `Loaded::Absent`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file {path} is corrupt: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("{kind} '{id}' already exists in this session")]
    DuplicateIdentifier { kind: &'static str, id: String },

    #[error("Invalid status transition for task '{task}': cannot go from '{from}' to '{to}'")]
    InvalidTransition {
        task: String,
        from: String,
        to: String,
    },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Task '{task}' is waiting on '{dependency}', which is not done")]
    BlockedByDependency { task: String, dependency: String },

    #[error("Task '{task}' is claimed by {owner}")]
    ClaimedByOther { task: String, owner: String },

    #[error("Review '{review}' is assigned to {reviewer}")]
    NotReviewer { review: String, reviewer: String },

    #[error("'{choice}' is not an option in vote '{topic}' (options: {options})")]
    InvalidChoice {
        topic: String,
        choice: String,
        options: String,
    },

    #[error("State store at {path} is busy (lock not acquired after {waited_ms}ms)")]
    StoreBusy { path: PathBuf, waited_ms: u64 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid status value: {0}. Valid values: pending, in_progress, done")]
    InvalidStatus(String),

    #[error("Invalid agent role: {0}")]
    InvalidRole(String),

    #[error("Invalid review verdict: {0}. Valid values: approved, needs_changes, rejected")]
    InvalidVerdict(String),
}

impl StoreError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn task_not_found(id: &str) -> Self {
        Self::not_found("Task", id)
    }

    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn duplicate(kind: &'static str, id: &str) -> Self {
        StoreError::DuplicateIdentifier {
            kind,
            id: id.to_string(),
        }
    }

    /// True for lock contention, the one failure callers are expected to retry.
    pub fn is_busy(&self) -> bool {
        matches!(self, StoreError::StoreBusy { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
