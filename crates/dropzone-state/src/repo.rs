//! Repository traits consumed by the assignment engine.
//!
//! The engine never touches storage directly. Each collaborator is a
//! narrow trait with boxed-future methods so implementations can be remote
//! and fail independently. [`StateStore`] implements all of them.

use std::future::Future;
use std::pin::Pin;

use crate::error::StateResult;
use crate::store::StateStore;
use crate::types::*;

/// Boxed future alias for repository calls.
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = StateResult<T>> + Send + 'a>>;

/// The live student queue.
pub trait QueueRepository: Send + Sync {
    /// Students in FIFO order.
    fn list_queue(&self) -> RepoFuture<'_, Vec<QueueStudent>>;

    fn get_student<'a>(&'a self, id: &'a str) -> RepoFuture<'a, Option<QueueStudent>>;

    fn enqueue<'a>(&'a self, student: &'a QueueStudent) -> RepoFuture<'a, ()>;

    /// Returns true if the student was queued.
    fn remove<'a>(&'a self, id: &'a str) -> RepoFuture<'a, bool>;

    fn remove_many<'a>(&'a self, ids: &'a [String]) -> RepoFuture<'a, u32>;
}

/// The instructor roster. Read-only for the engine.
pub trait InstructorRepository: Send + Sync {
    fn list_instructors(&self) -> RepoFuture<'_, Vec<Instructor>>;
}

pub trait LoadRepository: Send + Sync {
    /// Loads ordered by position.
    fn list_loads(&self) -> RepoFuture<'_, Vec<Load>>;

    fn update<'a>(&'a self, id: &'a str, update: LoadUpdate) -> RepoFuture<'a, Load>;
}

/// Assignments that live outside loads.
pub trait AssignmentLedger: Send + Sync {
    fn list_assignments(&self) -> RepoFuture<'_, Vec<Assignment>>;

    fn record<'a>(&'a self, assignment: &'a Assignment) -> RepoFuture<'a, ()>;

    fn revert<'a>(&'a self, id: &'a str, at: u64) -> RepoFuture<'a, Assignment>;
}

pub trait SettingsProvider: Send + Sync {
    /// Current settings, or defaults when none were stored yet.
    fn settings(&self) -> RepoFuture<'_, Settings>;
}

pub trait PeriodProvider: Send + Sync {
    fn active_period(&self) -> RepoFuture<'_, Option<Period>>;
}

impl QueueRepository for StateStore {
    fn list_queue(&self) -> RepoFuture<'_, Vec<QueueStudent>> {
        Box::pin(async move { StateStore::list_queue(self) })
    }

    fn get_student<'a>(&'a self, id: &'a str) -> RepoFuture<'a, Option<QueueStudent>> {
        Box::pin(async move { StateStore::get_student(self, id) })
    }

    fn enqueue<'a>(&'a self, student: &'a QueueStudent) -> RepoFuture<'a, ()> {
        Box::pin(async move { self.enqueue_student(student) })
    }

    fn remove<'a>(&'a self, id: &'a str) -> RepoFuture<'a, bool> {
        Box::pin(async move { self.remove_student(id) })
    }

    fn remove_many<'a>(&'a self, ids: &'a [String]) -> RepoFuture<'a, u32> {
        Box::pin(async move { self.remove_students(ids) })
    }
}

impl InstructorRepository for StateStore {
    fn list_instructors(&self) -> RepoFuture<'_, Vec<Instructor>> {
        Box::pin(async move { StateStore::list_instructors(self) })
    }
}

impl LoadRepository for StateStore {
    fn list_loads(&self) -> RepoFuture<'_, Vec<Load>> {
        Box::pin(async move { StateStore::list_loads(self) })
    }

    fn update<'a>(&'a self, id: &'a str, update: LoadUpdate) -> RepoFuture<'a, Load> {
        Box::pin(async move { self.update_load(id, update) })
    }
}

impl AssignmentLedger for StateStore {
    fn list_assignments(&self) -> RepoFuture<'_, Vec<Assignment>> {
        Box::pin(async move { self.list_ledger() })
    }

    fn record<'a>(&'a self, assignment: &'a Assignment) -> RepoFuture<'a, ()> {
        Box::pin(async move { self.record_assignment(assignment) })
    }

    fn revert<'a>(&'a self, id: &'a str, at: u64) -> RepoFuture<'a, Assignment> {
        Box::pin(async move { self.revert_ledger_assignment(id, at) })
    }
}

impl SettingsProvider for StateStore {
    fn settings(&self) -> RepoFuture<'_, Settings> {
        Box::pin(async move { Ok(StateStore::settings(self)?.unwrap_or_default()) })
    }
}

impl PeriodProvider for StateStore {
    fn active_period(&self) -> RepoFuture<'_, Option<Period>> {
        Box::pin(async move { StateStore::active_period(self) })
    }
}
