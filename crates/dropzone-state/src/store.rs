//! StateStore — redb-backed state persistence for the dropzone.
//!
//! Provides typed CRUD operations over the queue, instructors, loads, the
//! assignment ledger, periods and settings. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).
//!
//! Every successful write is announced on a broadcast change feed so that
//! the scheduler can be driven by data changes.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const CHANGE_FEED_CAPACITY: usize = 256;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    changes: broadcast::Sender<StoreChange>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            db: Arc::new(db),
            changes,
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [QUEUE, INSTRUCTORS, LOADS, LEDGER, PERIODS, SETTINGS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Subscribe to the change feed.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn emit(&self, change: StoreChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    // ── Generic row helpers ────────────────────────────────────────

    fn put_row<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_row<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_rows<T: DeserializeOwned>(&self, table: Table) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(row);
        }
        Ok(results)
    }

    /// Delete the given keys in one transaction. Returns how many existed.
    fn remove_rows(&self, table: Table, keys: &[&str]) -> StateResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = 0;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            for key in keys {
                if t.remove(*key).map_err(map_err!(Write))?.is_some() {
                    removed += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(removed)
    }

    /// Read-modify-write a single row inside one write transaction.
    fn modify_row<T, F>(
        &self,
        table: Table,
        collection: &'static str,
        key: &str,
        f: F,
    ) -> StateResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> StateResult<()>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let row = {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            let mut row: T = match t.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::not_found(collection, key)),
            };
            f(&mut row)?;
            let bytes = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
            row
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(row)
    }

    // ── Queue ──────────────────────────────────────────────────────

    /// Insert or update a waiting student.
    pub fn put_student(&self, student: &QueueStudent) -> StateResult<()> {
        self.put_row(QUEUE, &student.id, student)?;
        debug!(student_id = %student.id, "student queued");
        self.emit(StoreChange::Queue);
        Ok(())
    }

    /// Add a new student to the queue. Fails with `Conflict` when the id is
    /// already waiting, so a resubmission never resets `queued_at`.
    pub fn enqueue_student(&self, student: &QueueStudent) -> StateResult<()> {
        let bytes = serde_json::to_vec(student).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(QUEUE).map_err(map_err!(Table))?;
            if t.get(student.id.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict {
                    collection: "student",
                    id: student.id.clone(),
                });
            }
            t.insert(student.id.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(student_id = %student.id, queued_at = student.queued_at, "student enqueued");
        self.emit(StoreChange::Queue);
        Ok(())
    }

    pub fn get_student(&self, id: &str) -> StateResult<Option<QueueStudent>> {
        self.get_row(QUEUE, id)
    }

    /// The queue in FIFO order (`queued_at`, then id).
    pub fn list_queue(&self) -> StateResult<Vec<QueueStudent>> {
        let mut queue: Vec<QueueStudent> = self.list_rows(QUEUE)?;
        queue.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.id.cmp(&b.id)));
        Ok(queue)
    }

    /// Remove a student. Returns true if it was queued.
    pub fn remove_student(&self, id: &str) -> StateResult<bool> {
        let existed = self.remove_rows(QUEUE, &[id])? > 0;
        debug!(student_id = %id, existed, "student removed");
        if existed {
            self.emit(StoreChange::Queue);
        }
        Ok(existed)
    }

    /// Remove several students at once. Returns the number removed.
    pub fn remove_students(&self, ids: &[String]) -> StateResult<u32> {
        let keys: Vec<&str> = ids.iter().map(String::as_str).collect();
        let removed = self.remove_rows(QUEUE, &keys)?;
        if removed > 0 {
            self.emit(StoreChange::Queue);
        }
        Ok(removed)
    }

    // ── Instructors ────────────────────────────────────────────────

    /// Insert or update an instructor.
    pub fn put_instructor(&self, instructor: &Instructor) -> StateResult<()> {
        self.put_row(INSTRUCTORS, &instructor.id, instructor)?;
        debug!(
            instructor_id = %instructor.id,
            clocked_in = instructor.clocked_in,
            "instructor stored"
        );
        self.emit(StoreChange::Instructors);
        Ok(())
    }

    pub fn get_instructor(&self, id: &str) -> StateResult<Option<Instructor>> {
        self.get_row(INSTRUCTORS, id)
    }

    /// All instructors ordered by id.
    pub fn list_instructors(&self) -> StateResult<Vec<Instructor>> {
        self.list_rows(INSTRUCTORS)
    }

    /// Flip an instructor's clock-in state.
    pub fn set_clocked_in(&self, id: &str, clocked_in: bool) -> StateResult<Instructor> {
        let instructor = self.modify_row(INSTRUCTORS, "instructor", id, |inst: &mut Instructor| {
            inst.clocked_in = clocked_in;
            Ok(())
        })?;
        self.emit(StoreChange::Instructors);
        Ok(instructor)
    }

    // ── Loads ──────────────────────────────────────────────────────

    /// Insert or replace a load.
    pub fn put_load(&self, load: &Load) -> StateResult<()> {
        self.put_row(LOADS, &load.id, load)?;
        debug!(load_id = %load.id, position = load.position, "load stored");
        self.emit(StoreChange::Loads);
        Ok(())
    }

    pub fn get_load(&self, id: &str) -> StateResult<Option<Load>> {
        self.get_row(LOADS, id)
    }

    /// All loads ordered by position.
    pub fn list_loads(&self) -> StateResult<Vec<Load>> {
        let mut loads: Vec<Load> = self.list_rows(LOADS)?;
        loads.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Ok(loads)
    }

    /// Apply a typed partial update to a load in a single write transaction.
    pub fn update_load(&self, id: &str, update: LoadUpdate) -> StateResult<Load> {
        let load = self.modify_row(LOADS, "load", id, |load: &mut Load| {
            apply_load_update(load, update)
        })?;
        debug!(load_id = %id, "load updated");
        self.emit(StoreChange::Loads);
        Ok(load)
    }

    // ── Ledger ─────────────────────────────────────────────────────

    /// Record an assignment that is not attached to a load.
    pub fn record_assignment(&self, assignment: &Assignment) -> StateResult<()> {
        self.put_row(LEDGER, &assignment.id, assignment)?;
        debug!(assignment_id = %assignment.id, missed = assignment.missed, "assignment recorded");
        self.emit(StoreChange::Assignments);
        Ok(())
    }

    pub fn get_ledger_assignment(&self, id: &str) -> StateResult<Option<Assignment>> {
        self.get_row(LEDGER, id)
    }

    pub fn list_ledger(&self) -> StateResult<Vec<Assignment>> {
        self.list_rows(LEDGER)
    }

    /// Soft-delete a ledger assignment. Reverting twice keeps the first timestamp.
    pub fn revert_ledger_assignment(&self, id: &str, at: u64) -> StateResult<Assignment> {
        let assignment = self.modify_row(LEDGER, "assignment", id, |a: &mut Assignment| {
            a.reverted_at.get_or_insert(at);
            Ok(())
        })?;
        self.emit(StoreChange::Assignments);
        Ok(assignment)
    }

    /// Find an assignment wherever it lives: the ledger first, then loads.
    pub fn find_assignment(&self, id: &str) -> StateResult<Option<Assignment>> {
        if let Some(a) = self.get_ledger_assignment(id)? {
            return Ok(Some(a));
        }
        Ok(self
            .list_loads()?
            .into_iter()
            .flat_map(|l| l.assignments)
            .find(|a| a.id == id))
    }

    // ── Periods ────────────────────────────────────────────────────

    /// Insert or update a period. Activating a period deactivates all others
    /// in the same transaction, closing any still open at the new start.
    pub fn put_period(&self, period: &Period) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(PERIODS).map_err(map_err!(Table))?;
            if period.active {
                let mut others = Vec::new();
                for entry in t.iter().map_err(map_err!(Read))? {
                    let (key, value) = entry.map_err(map_err!(Read))?;
                    let mut other: Period =
                        serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                    if other.active && key.value() != period.id {
                        other.active = false;
                        other.ended_at.get_or_insert(period.started_at);
                        others.push(other);
                    }
                }
                for other in others {
                    let bytes = serde_json::to_vec(&other).map_err(map_err!(Serialize))?;
                    t.insert(other.id.as_str(), bytes.as_slice())
                        .map_err(map_err!(Write))?;
                }
            }
            let bytes = serde_json::to_vec(period).map_err(map_err!(Serialize))?;
            t.insert(period.id.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(period_id = %period.id, active = period.active, "period stored");
        self.emit(StoreChange::Periods);
        Ok(())
    }

    pub fn list_periods(&self) -> StateResult<Vec<Period>> {
        self.list_rows(PERIODS)
    }

    pub fn active_period(&self) -> StateResult<Option<Period>> {
        Ok(self.list_periods()?.into_iter().find(|p| p.active))
    }

    // ── Settings ───────────────────────────────────────────────────

    pub fn settings(&self) -> StateResult<Option<Settings>> {
        self.get_row(SETTINGS, SETTINGS_KEY)
    }

    pub fn put_settings(&self, settings: &Settings) -> StateResult<()> {
        self.put_row(SETTINGS, SETTINGS_KEY, settings)?;
        debug!(?settings, "settings stored");
        self.emit(StoreChange::Settings);
        Ok(())
    }
}

fn apply_load_update(load: &mut Load, update: LoadUpdate) -> StateResult<()> {
    match update {
        LoadUpdate::AppendAssignment { assignment } => {
            if load.assignments.iter().any(|a| a.id == assignment.id) {
                return Err(StateError::Write(format!(
                    "assignment {} already on load {}",
                    assignment.id, load.id
                )));
            }
            load.assignments.push(assignment);
        }
        LoadUpdate::RevertAssignment { assignment_id, at } => {
            let assignment = load
                .assignments
                .iter_mut()
                .find(|a| a.id == assignment_id)
                .ok_or_else(|| {
                    StateError::not_found("assignment", format!("{}/{}", load.id, assignment_id))
                })?;
            assignment.reverted_at.get_or_insert(at);
        }
        LoadUpdate::AddFunJumper { jumper } => load.fun_jumpers.push(jumper),
        LoadUpdate::SetStatus { status } => load.status = status,
    }
    Ok(())
}
