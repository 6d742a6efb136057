//! The two-write commit.
//!
//! An assignment is appended first (to its load, or to the ledger), then the
//! student leaves the queue. The repositories offer no transaction spanning
//! both writes, so a failed queue removal is retried and finally compensated
//! by soft-reverting the appended assignment. A removal that finds the
//! student already gone means another commit won the race; the append is
//! reverted the same way and the caller gets `StudentNotQueued`.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use dropzone_state::{Assignment, LoadUpdate, StateError};

use crate::context::Collaborators;
use crate::error::{AssignError, AssignResult, CommitStage};
use crate::plan::{CommitTarget, Plan};

/// Pause between queue removal attempts.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Write `plan` and return the committed assignment.
pub async fn commit_plan(
    collab: &Collaborators,
    plan: &Plan,
    write_retries: u32,
) -> AssignResult<Assignment> {
    let assignment = &plan.assignment;

    if let Err(e) = append(collab, &plan.target, assignment).await {
        warn!(
            assignment_id = %assignment.id,
            student_id = %assignment.student_id,
            error = %e,
            "append failed, queue left untouched"
        );
        return Err(AssignError::WriteFailure {
            stage: CommitStage::Append,
            reconciled: true,
            source: e,
        });
    }

    if plan.dequeue {
        match dequeue(collab, &assignment.student_id, write_retries).await {
            Ok(true) => {}
            Ok(false) => return Err(lost_race(collab, &plan.target, assignment).await),
            Err(e) => return Err(compensate(collab, &plan.target, assignment, e).await),
        }
    }

    info!(
        assignment_id = %assignment.id,
        student_id = %assignment.student_id,
        instructor_id = %assignment.instructor_id,
        load_id = assignment.load_id.as_deref().unwrap_or("-"),
        missed = assignment.missed,
        "assignment committed"
    );
    Ok(assignment.clone())
}

async fn append(
    collab: &Collaborators,
    target: &CommitTarget,
    assignment: &Assignment,
) -> Result<(), StateError> {
    match target {
        CommitTarget::Load(load_id) => {
            collab
                .loads
                .update(
                    load_id,
                    LoadUpdate::AppendAssignment {
                        assignment: assignment.clone(),
                    },
                )
                .await?;
        }
        CommitTarget::Ledger => collab.ledger.record(assignment).await?,
    }
    Ok(())
}

/// Remove the student from the queue. `Ok(false)` when it was already gone.
async fn dequeue(
    collab: &Collaborators,
    student_id: &str,
    retries: u32,
) -> Result<bool, StateError> {
    let mut attempt = 0;
    loop {
        match collab.queue.remove(student_id).await {
            Ok(removed) => return Ok(removed),
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(%student_id, attempt, error = %e, "queue removal failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Soft-revert the assignment that was just appended.
async fn revert_append(
    collab: &Collaborators,
    target: &CommitTarget,
    assignment: &Assignment,
) -> Result<(), StateError> {
    let at = dropzone_state::epoch_secs();
    match target {
        CommitTarget::Load(load_id) => collab
            .loads
            .update(
                load_id,
                LoadUpdate::RevertAssignment {
                    assignment_id: assignment.id.clone(),
                    at,
                },
            )
            .await
            .map(|_| ()),
        CommitTarget::Ledger => collab.ledger.revert(&assignment.id, at).await.map(|_| ()),
    }
}

/// The student left the queue between planning and removal.
async fn lost_race(
    collab: &Collaborators,
    target: &CommitTarget,
    assignment: &Assignment,
) -> AssignError {
    let student_id = &assignment.student_id;
    match revert_append(collab, target, assignment).await {
        Ok(()) => {
            debug!(
                assignment_id = %assignment.id,
                %student_id,
                "student already dequeued by another commit, assignment reverted"
            );
            AssignError::StudentNotQueued(student_id.clone())
        }
        Err(revert_err) => {
            error!(
                assignment_id = %assignment.id,
                %student_id,
                error = %revert_err,
                "duplicate assignment could not be reverted; manual cleanup required"
            );
            AssignError::WriteFailure {
                stage: CommitStage::Dequeue,
                reconciled: false,
                source: revert_err,
            }
        }
    }
}

/// Undo an append whose queue removal could not be completed.
async fn compensate(
    collab: &Collaborators,
    target: &CommitTarget,
    assignment: &Assignment,
    cause: StateError,
) -> AssignError {
    match revert_append(collab, target, assignment).await {
        Ok(()) => {
            warn!(
                assignment_id = %assignment.id,
                student_id = %assignment.student_id,
                error = %cause,
                "queue removal failed, assignment reverted"
            );
            AssignError::WriteFailure {
                stage: CommitStage::Dequeue,
                reconciled: true,
                source: cause,
            }
        }
        Err(revert_err) => {
            error!(
                assignment_id = %assignment.id,
                student_id = %assignment.student_id,
                error = %cause,
                revert_error = %revert_err,
                "assignment committed but student still queued; manual cleanup required"
            );
            AssignError::WriteFailure {
                stage: CommitStage::Dequeue,
                reconciled: false,
                source: cause,
            }
        }
    }
}
