//! Auto-assign scheduler: picks the next queued student, counts down, then
//! commits through the same plan/commit path as manual assignments.
//!
//! ```text
//!   Idle ──evaluate──▶ Countdown ──expiry──▶ Committing ──▶ Idle
//!                          │
//!                          └──cancel──▶ Idle
//! ```
//!
//! The machine lives behind a `std::sync::Mutex` that is never held across
//! an `.await`. Each countdown carries the generation it was started with;
//! cancelling bumps the generation and aborts the task, so a countdown that
//! wakes up late can tell it is stale and leave without writing.
//!
//! Commits are serialized by a separate async gate held from the snapshot
//! read through the last write. Every plan therefore sees the seats and
//! queue removals of the commit before it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dropzone_rotation::{BalanceSheet, balances};
use dropzone_state::{Assignment, LoadUpdate, QueueStudent, StoreChange, epoch_secs};

use crate::commit::commit_plan;
use crate::context::{Collaborators, EngineConfig, Snapshot};
use crate::error::{AssignError, AssignResult};
use crate::notify::Notification;
use crate::plan::{Overrides, plan_assignment};

const TICK: Duration = Duration::from_secs(1);

/// Observable scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SchedulerStatus {
    Idle,
    Countdown {
        student_id: String,
        student_name: String,
        remaining_secs: u64,
    },
    Committing {
        student_id: String,
    },
    /// Shut down; no further commits.
    Stopped,
}

/// Triggers that make the scheduler look at the queue again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    QueueChanged,
    RosterChanged,
    LoadsChanged,
    SettingsChanged,
    /// Periodic re-check.
    Tick,
}

impl From<StoreChange> for EngineEvent {
    fn from(change: StoreChange) -> Self {
        match change {
            StoreChange::Queue => EngineEvent::QueueChanged,
            StoreChange::Instructors | StoreChange::Periods => EngineEvent::RosterChanged,
            StoreChange::Loads | StoreChange::Assignments => EngineEvent::LoadsChanged,
            StoreChange::Settings => EngineEvent::SettingsChanged,
        }
    }
}

/// Who the manual assignment is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StudentRef {
    /// A student waiting in the queue; removed on commit.
    Queued { student_id: String },
    /// A walk-in that never went through the queue.
    AdHoc {
        name: String,
        weight: u32,
        jump: dropzone_state::Jump,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualAssignment {
    pub student: StudentRef,
    #[serde(flatten)]
    pub overrides: Overrides,
}

struct Machine {
    phase: SchedulerStatus,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    collab: Collaborators,
    config: EngineConfig,
    machine: Mutex<Machine>,
    status_tx: watch::Sender<SchedulerStatus>,
    commit_gate: tokio::sync::Mutex<()>,
}

/// The student a commit is for.
enum Subject {
    /// Re-read from the queue once the commit gate is held.
    Queued(String),
    /// Never queued; nothing to remove.
    Walkin(QueueStudent),
}

/// The auto-assign engine. Cheap to clone; clones share one machine.
#[derive(Clone)]
pub struct AutoAssigner {
    inner: Arc<Inner>,
}

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

impl AutoAssigner {
    pub fn new(collab: Collaborators, config: EngineConfig) -> Self {
        let (status_tx, _) = watch::channel(SchedulerStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                collab,
                config,
                machine: Mutex::new(Machine {
                    phase: SchedulerStatus::Idle,
                    generation: 0,
                    task: None,
                }),
                status_tx,
                commit_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Balances of the active period, lowest first.
    pub async fn balance_sheet(&self) -> AssignResult<BalanceSheet> {
        let snapshot = Snapshot::capture(&self.inner.collab).await?;
        Ok(balances(&snapshot.rotation(&self.inner.config)))
    }

    fn machine(&self) -> MutexGuard<'_, Machine> {
        // Poisoning is ignored: the machine holds plain data.
        self.inner
            .machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, machine: &mut Machine, phase: SchedulerStatus) {
        machine.phase = phase.clone();
        self.inner.status_tx.send_replace(phase);
    }

    /// Start a countdown for the next student if the scheduler is idle and
    /// auto-assign is on. Returns the student id when one was started.
    pub async fn evaluate_and_maybe_schedule(&self) -> AssignResult<Option<String>> {
        let generation = {
            let m = self.machine();
            if m.phase != SchedulerStatus::Idle {
                return Ok(None);
            }
            m.generation
        };

        let settings = self.inner.collab.settings.settings().await?;
        if !settings.auto_assign {
            return Ok(None);
        }

        let queue = self.inner.collab.queue.list_queue().await?;
        let waiting: Vec<&QueueStudent> = queue
            .iter()
            .filter(|s| !(settings.skip_requests && s.is_request))
            .collect();

        if settings.batch_mode && (waiting.len() as u64) < u64::from(settings.batch_size) {
            debug!(
                waiting = waiting.len(),
                batch_size = settings.batch_size,
                "batch not full yet"
            );
            return Ok(None);
        }
        let Some(student) = waiting.first() else {
            return Ok(None);
        };

        let delay = settings.delay_secs;
        {
            let mut m = self.machine();
            if m.phase != SchedulerStatus::Idle || m.generation != generation {
                return Ok(None);
            }
            m.generation += 1;
            let task_generation = m.generation;
            self.set_phase(
                &mut m,
                SchedulerStatus::Countdown {
                    student_id: student.id.clone(),
                    student_name: student.name.clone(),
                    remaining_secs: delay,
                },
            );
            m.task = Some(tokio::spawn(self.clone().countdown(
                task_generation,
                (*student).clone(),
                delay,
            )));
        }

        info!(student_id = %student.id, delay_secs = delay, "auto-assign countdown started");
        self.inner.collab.notifier.notify(Notification::CountdownStarted {
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            delay_secs: delay,
        });
        Ok(Some(student.id.clone()))
    }

    /// Stop the running countdown. The student stays queued and nothing is
    /// written. Returns false when there was no countdown to cancel.
    pub fn cancel_pending_assignment(&self) -> bool {
        let student_id = {
            let mut m = self.machine();
            let SchedulerStatus::Countdown { student_id, .. } = &m.phase else {
                return false;
            };
            let student_id = student_id.clone();
            m.generation += 1;
            if let Some(task) = m.task.take() {
                task.abort();
            }
            self.set_phase(&mut m, SchedulerStatus::Idle);
            student_id
        };

        info!(%student_id, "auto-assign countdown cancelled");
        self.inner
            .collab
            .notifier
            .notify(Notification::CountdownCancelled { student_id });
        true
    }

    /// Tear down any countdown. No commit starts after this returns.
    pub fn shutdown(&self) {
        let mut m = self.machine();
        m.generation += 1;
        if let Some(task) = m.task.take() {
            task.abort();
        }
        self.set_phase(&mut m, SchedulerStatus::Stopped);
        info!("auto-assign scheduler stopped");
    }

    fn countdown(self, generation: u64, student: QueueStudent, delay: u64) -> TaskFuture {
        Box::pin(async move {
            for remaining in (1..=delay).rev() {
                if !self.publish_remaining(generation, remaining) {
                    return;
                }
                tokio::time::sleep(TICK).await;
            }

            {
                let mut m = self.machine();
                if m.generation != generation {
                    return;
                }
                // Past this point cancel has nothing to abort.
                m.task = None;
                self.set_phase(
                    &mut m,
                    SchedulerStatus::Committing {
                        student_id: student.id.clone(),
                    },
                );
            }

            let outcome = self.commit_queued(&student.id, Some(generation)).await;

            {
                let mut m = self.machine();
                if m.phase != SchedulerStatus::Stopped {
                    self.set_phase(&mut m, SchedulerStatus::Idle);
                }
            }

            match outcome {
                Ok(_) => {
                    if let Err(e) = self.evaluate_and_maybe_schedule().await {
                        warn!(error = %e, "re-evaluation after commit failed");
                    }
                }
                Err(e) => {
                    warn!(student_id = %student.id, error = %e, "auto-assign aborted");
                    self.inner
                        .collab
                        .notifier
                        .notify(Notification::AssignmentAborted {
                            student_id: student.id.clone(),
                            reason: e.to_string(),
                        });
                }
            }
        })
    }

    fn publish_remaining(&self, generation: u64, remaining: u64) -> bool {
        let mut m = self.machine();
        if m.generation != generation {
            return false;
        }
        if let SchedulerStatus::Countdown {
            student_id,
            student_name,
            ..
        } = &m.phase
        {
            let phase = SchedulerStatus::Countdown {
                student_id: student_id.clone(),
                student_name: student_name.clone(),
                remaining_secs: remaining,
            };
            self.set_phase(&mut m, phase);
        }
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.machine().generation == generation
    }

    /// Revalidate and commit a queued student. With `generation` set, the
    /// commit is dropped if the machine moved on while reading.
    async fn commit_queued(
        &self,
        student_id: &str,
        generation: Option<u64>,
    ) -> AssignResult<Assignment> {
        self.commit_subject(
            Subject::Queued(student_id.to_string()),
            &Overrides::default(),
            generation,
        )
        .await
    }

    async fn commit_subject(
        &self,
        subject: Subject,
        overrides: &Overrides,
        generation: Option<u64>,
    ) -> AssignResult<Assignment> {
        let collab = &self.inner.collab;
        let _gate = self.inner.commit_gate.lock().await;

        let (student, dequeue) = match subject {
            Subject::Queued(id) => {
                let student = collab
                    .queue
                    .get_student(&id)
                    .await?
                    .ok_or(AssignError::StudentNotQueued(id))?;
                (student, true)
            }
            Subject::Walkin(student) => (student, false),
        };

        let snapshot = Snapshot::capture(collab).await?;
        let plan = plan_assignment(
            &snapshot,
            &self.inner.config,
            &student,
            overrides,
            dequeue,
            epoch_secs(),
        )?;
        debug!(
            student_id = %student.id,
            instructor_id = %plan.assignment.instructor_id,
            balance = plan.balance,
            target = ?plan.target,
            "assignment planned"
        );

        if generation.is_some_and(|g| !self.is_current(g)) {
            return Err(AssignError::Cancelled);
        }

        let assignment = commit_plan(collab, &plan, self.inner.config.write_retries).await?;
        collab.notifier.notify(Notification::AssignmentCommitted {
            assignment_id: assignment.id.clone(),
            student_name: assignment.student_name.clone(),
            instructor_id: assignment.instructor_id.clone(),
            load_id: assignment.load_id.clone(),
        });
        Ok(assignment)
    }

    /// Assign immediately, bypassing the countdown.
    pub async fn commit_manual_assignment(
        &self,
        request: ManualAssignment,
    ) -> AssignResult<Assignment> {
        match &request.student {
            StudentRef::Queued { student_id } => {
                self.cancel_if_counting_down(student_id);
                self.commit_subject(
                    Subject::Queued(student_id.clone()),
                    &request.overrides,
                    None,
                )
                .await
            }
            StudentRef::AdHoc { name, weight, jump } => {
                if name.trim().is_empty() {
                    return Err(AssignError::InvalidRequest("student name is empty".into()));
                }
                if *weight == 0 {
                    return Err(AssignError::InvalidRequest("student weight is zero".into()));
                }
                let now = epoch_secs();
                let student = QueueStudent {
                    id: format!("walkin-{}", uuid::Uuid::new_v4()),
                    name: name.clone(),
                    weight: *weight,
                    is_request: false,
                    group_id: None,
                    jump: jump.clone(),
                    queued_at: now,
                };
                self.commit_subject(Subject::Walkin(student), &request.overrides, None)
                    .await
            }
        }
    }

    fn cancel_if_counting_down(&self, student_id: &str) {
        let counting = matches!(
            &self.machine().phase,
            SchedulerStatus::Countdown { student_id: pending, .. } if pending == student_id
        );
        if counting {
            self.cancel_pending_assignment();
        }
    }

    /// Soft-delete a committed assignment, wherever it lives. The record is
    /// kept; its seats and pay are released.
    pub async fn revert_assignment(&self, assignment_id: &str) -> AssignResult<Assignment> {
        let collab = &self.inner.collab;
        let _gate = self.inner.commit_gate.lock().await;
        let at = epoch_secs();

        let loads = collab.loads.list_loads().await?;
        let on_load = loads.iter().find_map(|load| {
            load.assignments
                .iter()
                .find(|a| a.id == assignment_id)
                .map(|a| (load.id.clone(), a.is_reverted()))
        });

        let reverted = match on_load {
            Some((_, true)) => {
                return Err(AssignError::InvalidRequest(format!(
                    "assignment {assignment_id} already reverted"
                )));
            }
            Some((load_id, false)) => {
                let load = collab
                    .loads
                    .update(
                        &load_id,
                        LoadUpdate::RevertAssignment {
                            assignment_id: assignment_id.to_string(),
                            at,
                        },
                    )
                    .await?;
                load.assignments
                    .into_iter()
                    .find(|a| a.id == assignment_id)
                    .ok_or_else(|| AssignError::AssignmentNotFound(assignment_id.to_string()))?
            }
            None => {
                let ledger = collab.ledger.list_assignments().await?;
                match ledger.iter().find(|a| a.id == assignment_id) {
                    None => return Err(AssignError::AssignmentNotFound(assignment_id.to_string())),
                    Some(a) if a.is_reverted() => {
                        return Err(AssignError::InvalidRequest(format!(
                            "assignment {assignment_id} already reverted"
                        )));
                    }
                    Some(_) => collab.ledger.revert(assignment_id, at).await?,
                }
            }
        };

        info!(
            %assignment_id,
            load_id = reverted.load_id.as_deref().unwrap_or("-"),
            "assignment reverted"
        );
        collab.notifier.notify(Notification::AssignmentReverted {
            assignment_id: assignment_id.to_string(),
        });
        Ok(reverted)
    }

    /// Drive the scheduler from `events` until `shutdown` flips.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<EngineEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("auto-assign loop starting");
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    self.handle_event(event).await;
                }
                _ = shutdown.changed() => {
                    debug!("auto-assign loop shutting down");
                    break;
                }
            }
        }
        self.shutdown();
    }

    async fn handle_event(&self, event: EngineEvent) {
        if event == EngineEvent::SettingsChanged {
            match self.inner.collab.settings.settings().await {
                Ok(settings) if !settings.auto_assign => {
                    self.cancel_pending_assignment();
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "failed to read settings");
                    return;
                }
            }
        }
        if let Err(e) = self.evaluate_and_maybe_schedule().await {
            warn!(?event, error = %e, "auto-assign evaluation failed");
        }
    }
}
