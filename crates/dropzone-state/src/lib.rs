//! dropzone-state — embedded state store and repository traits.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state for the student queue, the instructor roster, loads, the assignment
//! ledger, rotation periods and operator settings.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! The assignment engine only sees the traits in [`repo`]; `StateStore`
//! implements every one of them and can be shared across async tasks
//! (`Clone` + `Send` + `Sync`, backed by `Arc<Database>`).

pub mod error;
pub mod repo;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repo::{
    AssignmentLedger, InstructorRepository, LoadRepository, PeriodProvider, QueueRepository,
    RepoFuture, SettingsProvider,
};
pub use store::StateStore;
pub use types::*;
