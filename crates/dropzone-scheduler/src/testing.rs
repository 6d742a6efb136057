//! Test fixtures: an in-memory store with injectable write failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use dropzone_state::*;

use crate::context::Collaborators;
use crate::notify::BroadcastNotifier;

/// Delegates to a [`StateStore`] but fails queue removals and load
/// updates on demand, and can yield to other tasks after reading loads so
/// that concurrent commits interleave.
pub(crate) struct FlakyStore {
    inner: StateStore,
    queue_failures: AtomicU32,
    queue_attempts: AtomicU32,
    load_passes: AtomicU32,
    load_failures: AtomicU32,
    yield_after_list: AtomicBool,
}

impl FlakyStore {
    fn new(inner: StateStore) -> Self {
        Self {
            inner,
            queue_failures: AtomicU32::new(0),
            queue_attempts: AtomicU32::new(0),
            load_passes: AtomicU32::new(0),
            load_failures: AtomicU32::new(0),
            yield_after_list: AtomicBool::new(false),
        }
    }

    fn store(&self) -> &StateStore {
        &self.inner
    }

    pub fn fail_queue_removals(&self, n: u32) {
        self.queue_failures.store(n, Ordering::SeqCst);
    }

    pub fn queue_removal_attempts(&self) -> u32 {
        self.queue_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_load_updates(&self, n: u32) {
        self.load_passes.store(0, Ordering::SeqCst);
        self.load_failures.store(n, Ordering::SeqCst);
    }

    /// Hand control back to the runtime after every `list_loads`.
    pub fn yield_after_load_list(&self) {
        self.yield_after_list.store(true, Ordering::SeqCst);
    }

    /// Let `passes` updates through, then fail every one after.
    pub fn fail_load_updates_after(&self, passes: u32) {
        self.load_passes.store(passes, Ordering::SeqCst);
        self.load_failures.store(u32::MAX, Ordering::SeqCst);
    }
}

/// Consume one injected failure. `u32::MAX` never runs out.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
            0 => None,
            u32::MAX => Some(u32::MAX),
            n => Some(n - 1),
        })
        .is_ok()
}

impl QueueRepository for FlakyStore {
    fn list_queue(&self) -> RepoFuture<'_, Vec<QueueStudent>> {
        QueueRepository::list_queue(self.store())
    }

    fn get_student<'a>(&'a self, id: &'a str) -> RepoFuture<'a, Option<QueueStudent>> {
        QueueRepository::get_student(self.store(), id)
    }

    fn enqueue<'a>(&'a self, student: &'a QueueStudent) -> RepoFuture<'a, ()> {
        self.store().enqueue(student)
    }

    fn remove<'a>(&'a self, id: &'a str) -> RepoFuture<'a, bool> {
        self.queue_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.queue_failures) {
            return Box::pin(async { Err(StateError::Write("injected queue failure".into())) });
        }
        self.store().remove(id)
    }

    fn remove_many<'a>(&'a self, ids: &'a [String]) -> RepoFuture<'a, u32> {
        self.store().remove_many(ids)
    }
}

impl LoadRepository for FlakyStore {
    fn list_loads(&self) -> RepoFuture<'_, Vec<Load>> {
        let yielding = self.yield_after_list.load(Ordering::SeqCst);
        Box::pin(async move {
            let loads = LoadRepository::list_loads(self.store()).await?;
            if yielding {
                tokio::task::yield_now().await;
            }
            Ok(loads)
        })
    }

    fn update<'a>(&'a self, id: &'a str, update: LoadUpdate) -> RepoFuture<'a, Load> {
        if !take_failure(&self.load_passes) && take_failure(&self.load_failures) {
            return Box::pin(async { Err(StateError::Write("injected load failure".into())) });
        }
        self.store().update(id, update)
    }
}

pub(crate) struct Harness {
    pub store: StateStore,
    pub flaky: Arc<FlakyStore>,
    pub notifier: BroadcastNotifier,
    pub collab: Collaborators,
}

impl Harness {
    /// Store with an open period, one building load `l1` and one clocked-in
    /// tandem instructor `i1`.
    pub fn new() -> Self {
        let store = StateStore::open_in_memory().unwrap();
        store.put_period(&Period::open("p1", "Test", 0)).unwrap();
        store.put_load(&Load::new("l1", 1, "otter")).unwrap();
        store.put_instructor(&tandem_instructor("i1")).unwrap();

        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let notifier = BroadcastNotifier::new(64);
        let mut collab = Collaborators::from_store(store.clone(), Arc::new(notifier.clone()));
        collab.queue = flaky.clone();
        collab.loads = flaky.clone();

        Self {
            store,
            flaky,
            notifier,
            collab,
        }
    }

    pub fn enqueue(&self, id: &str, jump: Jump, queued_at: u64) {
        self.store
            .put_student(&QueueStudent {
                id: id.to_string(),
                name: format!("Student {id}"),
                weight: 180,
                is_request: false,
                group_id: None,
                jump,
                queued_at,
            })
            .unwrap();
    }

    pub fn update_settings(&self, f: impl FnOnce(&mut Settings)) {
        let mut settings = self.store.settings().unwrap().unwrap_or_default();
        f(&mut settings);
        self.store.put_settings(&settings).unwrap();
    }
}

pub(crate) fn tandem_instructor(id: &str) -> Instructor {
    let mut inst = Instructor::new(id, id);
    inst.capabilities.tandem = true;
    inst.clocked_in = true;
    inst
}
