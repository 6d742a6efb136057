//! Assignment engine error types.

use std::fmt;

use thiserror::Error;

use dropzone_state::StateError;

/// Which write of the two-write commit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStage {
    /// Appending the assignment to a load or the ledger.
    Append,
    /// Removing the student from the queue.
    Dequeue,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitStage::Append => write!(f, "append"),
            CommitStage::Dequeue => write!(f, "dequeue"),
        }
    }
}

/// Errors from planning or committing an assignment.
///
/// None of these are fatal to the scheduler: an auto-assign cycle that hits
/// one returns to idle and reports it as a notification.
#[derive(Debug, Error)]
pub enum AssignError {
    #[error("no qualified instructor for student {0}")]
    NoQualifiedInstructor(String),

    #[error("no load with room for student {0}")]
    NoAvailableLoad(String),

    #[error("pending assignment cancelled")]
    Cancelled,

    #[error("student no longer queued: {0}")]
    StudentNotQueued(String),

    #[error("instructor not found: {0}")]
    InstructorNotFound(String),

    #[error("load not found: {0}")]
    LoadNotFound(String),

    #[error("assignment not found: {0}")]
    AssignmentNotFound(String),

    #[error("no active rotation period")]
    NoActivePeriod,

    /// `reconciled` is true when the store was left consistent.
    #[error("write failed during {stage} (reconciled: {reconciled}): {source}")]
    WriteFailure {
        stage: CommitStage,
        reconciled: bool,
        #[source]
        source: StateError,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("repository error: {0}")]
    Repository(#[from] StateError),
}

pub type AssignResult<T> = Result<T, AssignError>;
