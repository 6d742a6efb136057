//! Dropzone assignment engine.
//!
//! Turns the student queue into committed assignments. Two entry points
//! share one path:
//!
//! - **`scheduler`** — `AutoAssigner`, the countdown-driven auto-assign state
//!   machine, plus manual assignment and revert
//! - **`plan`** — eligibility, balance ranking and load selection for one student
//! - **`commit`** — the append-then-dequeue write with compensation
//! - **`context`** — repository bundle, engine config, read snapshots
//! - **`notify`** — notification sinks

pub mod commit;
pub mod context;
pub mod error;
pub mod notify;
pub mod plan;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use commit::commit_plan;
pub use context::{Collaborators, EngineConfig, Snapshot};
pub use error::{AssignError, AssignResult, CommitStage};
pub use notify::{BroadcastNotifier, Notification, NotificationSink, TracingNotifier};
pub use plan::{CommitTarget, Overrides, Plan, plan_assignment};
pub use scheduler::{AutoAssigner, EngineEvent, ManualAssignment, SchedulerStatus, StudentRef};
