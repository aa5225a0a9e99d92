//! Typed errors for every engine operation.
//!
//! Failures are never partially applied: an operation that returns an error
//! has left the persisted store untouched. Validation problems are collected
//! and reported together so the caller sees every offending id at once.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::task::TaskStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A task with this id already exists in the phase's task set.
    #[error("duplicate task id '{task_id}'")]
    DuplicateId { task_id: String },

    /// A declared parent id does not exist in the same task set.
    #[error("task '{task_id}' references unknown parent '{parent_id}'")]
    InvalidParent { task_id: String, parent_id: String },

    /// The requested parent edges would make the task reachable from itself.
    #[error("task '{task_id}' would create a dependency cycle")]
    Cycle { task_id: String },

    #[error("unknown task '{task_id}'")]
    UnknownTask { task_id: String },

    /// Status transition outside the permitted forward moves.
    #[error("task '{task_id}': invalid transition {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Transitioning to `blocked` requires a blocker record on disk first.
    #[error("task '{task_id}' has no blocker record at {}", path.display())]
    MissingBlockerRecord { task_id: String, path: PathBuf },

    #[error("unknown phase '{phase_id}'")]
    UnknownPhase { phase_id: String },

    /// Blocked tasks gate every transition except the `on_blocked` route.
    #[error("phase '{phase_id}' has blocked tasks: {}", task_ids.join(", "))]
    BlockedTasksExist {
        phase_id: String,
        task_ids: Vec<String>,
    },

    /// Re-entering a phase demands an articulated reason for what changed.
    #[error(
        "re-entry into phase '{phase_id}' needs a reason of at least {minimum} chars (got {length})"
    )]
    ReentryReasonTooShort {
        phase_id: String,
        length: usize,
        minimum: usize,
    },

    /// Exit guard: the current phase has not produced its required artifacts.
    #[error("phase '{phase_id}' is missing required artifacts: {}", names.join(", "))]
    MissingArtifacts {
        phase_id: String,
        names: Vec<String>,
    },

    /// The transition is approval-gated and no approval has been recorded.
    #[error("transition {from} -> {to} requires approval")]
    ApprovalRequired { from: String, to: String },

    /// Task-graph mutation aimed at a phase that is not the current one.
    #[error("phase '{requested}' is not the current phase ('{current}')")]
    WrongPhase { current: String, requested: String },

    /// All-or-nothing validation failure; nothing was mutated.
    #[error("validation failed:\n- {}", problems.join("\n- "))]
    Validation { problems: Vec<String> },

    #[error("no expansion backup at {}", path.display())]
    NoBackup { path: PathBuf },

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("unknown plan '{name}'")]
    UnknownPlan { name: String },

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("json {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("toml {}: {source}", path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("serialize toml: {source}")]
    TomlSerialize { source: toml::ser::Error },
}

impl Error {
    /// Single-problem validation error.
    pub fn validation(problem: impl Into<String>) -> Self {
        Error::Validation {
            problems: vec![problem.into()],
        }
    }
}
