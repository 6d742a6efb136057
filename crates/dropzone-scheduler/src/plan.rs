//! Assignment planning.
//!
//! Both the auto-assign countdown and manual assignments go through
//! [`plan_assignment`]: eligibility, then balance ranking, then load
//! capacity. Planning only reads the snapshot; nothing is written here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use dropzone_rotation::{
    RankedInstructor, eligible, eligible_video, is_candidate, is_eligible, is_video_eligible,
    pick_pairing, rank_instructors, seat_cost,
};
use dropzone_state::{Assignment, Instructor, Jump, Load, QueueStudent};

use crate::context::{EngineConfig, Snapshot};
use crate::error::{AssignError, AssignResult};

/// Where the assignment is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "load_id", rename_all = "snake_case")]
pub enum CommitTarget {
    Load(String),
    /// Missed jumps and other records with no seat.
    Ledger,
}

/// Caller choices layered over the automatic selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default)]
    pub instructor_id: Option<String>,
    #[serde(default)]
    pub load_id: Option<String>,
    /// The absent instructor the chosen instructor is working for.
    #[serde(default)]
    pub covering_for: Option<String>,
    #[serde(default)]
    pub video_instructor_id: Option<String>,
    #[serde(default)]
    pub missed: bool,
}

/// A fully decided assignment, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub assignment: Assignment,
    pub target: CommitTarget,
    /// Remove the student from the queue after the append.
    pub dequeue: bool,
    /// Balance of the chosen instructor at planning time.
    pub balance: i64,
}

/// Decide instructor, load and video flyer for `student`.
pub fn plan_assignment(
    snapshot: &Snapshot,
    config: &EngineConfig,
    student: &QueueStudent,
    overrides: &Overrides,
    dequeue: bool,
    now: u64,
) -> AssignResult<Plan> {
    if let Some(absent) = overrides.covering_for.as_deref() {
        let absent = snapshot
            .instructor(absent)
            .ok_or_else(|| AssignError::InstructorNotFound(absent.to_string()))?;
        if absent.clocked_in {
            return Err(AssignError::InvalidRequest(format!(
                "cannot cover for {}: instructor is clocked in",
                absent.id
            )));
        }
    }

    let jump_type = student.jump.jump_type();
    let ctx = snapshot.rotation(config);

    let candidates: Vec<&Instructor> = match overrides.instructor_id.as_deref() {
        Some(id) => {
            let inst = snapshot
                .instructor(id)
                .ok_or_else(|| AssignError::InstructorNotFound(id.to_string()))?;
            if !is_eligible(inst, jump_type, student.weight) {
                debug!(
                    instructor = %id,
                    student = %student.id,
                    "requested instructor not eligible"
                );
                return Err(AssignError::NoQualifiedInstructor(student.id.clone()));
            }
            vec![inst]
        }
        None => eligible(&snapshot.instructors, jump_type, student.weight),
    };
    if candidates.is_empty() {
        return Err(AssignError::NoQualifiedInstructor(student.id.clone()));
    }
    let ranked = rank_instructors(&candidates, &ctx);

    if overrides.missed {
        let chosen = &ranked[0];
        let assignment = build_assignment(student, chosen.instructor, None, None, overrides, now);
        return Ok(Plan {
            assignment,
            target: CommitTarget::Ledger,
            dequeue,
            balance: chosen.balance,
        });
    }

    let seats = seat_cost(&student.jump);
    let (chosen, load) = choose_load(snapshot, config, &ranked, seats, overrides, &student.id)?;

    let video = if student.jump.outside_video() {
        Some(choose_video(snapshot, config, student, chosen.instructor, load, overrides)?)
    } else {
        None
    };

    let assignment = build_assignment(
        student,
        chosen.instructor,
        Some(load),
        video.map(|v| v.id.clone()),
        overrides,
        now,
    );
    Ok(Plan {
        assignment,
        target: CommitTarget::Load(load.id.clone()),
        dequeue,
        balance: chosen.balance,
    })
}

fn choose_load<'a>(
    snapshot: &'a Snapshot,
    config: &EngineConfig,
    ranked: &[RankedInstructor<'a>],
    seats: u32,
    overrides: &Overrides,
    student_id: &str,
) -> AssignResult<(RankedInstructor<'a>, &'a Load)> {
    match overrides.load_id.as_deref() {
        Some(load_id) => {
            let load = snapshot
                .load(load_id)
                .ok_or_else(|| AssignError::LoadNotFound(load_id.to_string()))?;
            if !is_candidate(load, seats, &config.loads) {
                return Err(AssignError::NoAvailableLoad(student_id.to_string()));
            }
            let chosen = ranked
                .iter()
                .find(|r| r.instructor.qualified_on(&load.aircraft))
                .ok_or_else(|| AssignError::NoQualifiedInstructor(student_id.to_string()))?;
            Ok((chosen.clone(), load))
        }
        None => {
            let pairing = pick_pairing(ranked, &snapshot.loads, seats, &config.loads)
                .ok_or_else(|| AssignError::NoAvailableLoad(student_id.to_string()))?;
            Ok((
                RankedInstructor {
                    instructor: pairing.instructor,
                    balance: pairing.balance,
                },
                pairing.load,
            ))
        }
    }
}

fn choose_video<'a>(
    snapshot: &'a Snapshot,
    config: &EngineConfig,
    student: &QueueStudent,
    primary: &Instructor,
    load: &Load,
    overrides: &Overrides,
) -> AssignResult<&'a Instructor> {
    let usable = |inst: &Instructor| inst.id != primary.id && inst.qualified_on(&load.aircraft);

    if let Some(id) = overrides.video_instructor_id.as_deref() {
        let inst = snapshot
            .instructor(id)
            .ok_or_else(|| AssignError::InstructorNotFound(id.to_string()))?;
        if !is_video_eligible(inst, student.weight) || !usable(inst) {
            return Err(AssignError::NoQualifiedInstructor(student.id.clone()));
        }
        return Ok(inst);
    }

    let candidates: Vec<&Instructor> = eligible_video(&snapshot.instructors, student.weight)
        .into_iter()
        .filter(|i| usable(*i))
        .collect();
    rank_instructors(&candidates, &snapshot.rotation(config))
        .first()
        .map(|r| r.instructor)
        .ok_or_else(|| AssignError::NoQualifiedInstructor(student.id.clone()))
}

fn build_assignment(
    student: &QueueStudent,
    instructor: &Instructor,
    load: Option<&Load>,
    video_instructor_id: Option<String>,
    overrides: &Overrides,
    now: u64,
) -> Assignment {
    let jump = match (&student.jump, overrides.missed) {
        // A missed jump carries no video flyer.
        (
            Jump::Tandem {
                weight_tax,
                handcam,
                ..
            },
            true,
        ) => Jump::Tandem {
            weight_tax: *weight_tax,
            handcam: *handcam,
            outside_video: false,
        },
        (jump, _) => jump.clone(),
    };
    Assignment {
        id: format!("asg-{}", uuid::Uuid::new_v4()),
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        student_weight: student.weight,
        instructor_id: instructor.id.clone(),
        // The roster relation applies when the caller names nobody.
        covering_for: overrides
            .covering_for
            .clone()
            .or_else(|| instructor.covering_for.clone()),
        video_instructor_id,
        load_id: load.map(|l| l.id.clone()),
        jump,
        missed: overrides.missed,
        queued_at: student.queued_at,
        assigned_at: now,
        reverted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropzone_state::{Period, Settings, WeightRange};

    fn tandem_instructor(id: &str) -> Instructor {
        let mut i = Instructor::new(id, id);
        i.capabilities.tandem = true;
        i.clocked_in = true;
        i
    }

    fn video_instructor(id: &str) -> Instructor {
        let mut i = Instructor::new(id, id);
        i.capabilities.video = true;
        i.clocked_in = true;
        i
    }

    fn student(jump: Jump) -> QueueStudent {
        QueueStudent {
            id: "s1".to_string(),
            name: "Sam".to_string(),
            weight: 180,
            is_request: false,
            group_id: None,
            jump,
            queued_at: 42,
        }
    }

    fn video_jump() -> Jump {
        Jump::Tandem {
            weight_tax: 0,
            handcam: false,
            outside_video: true,
        }
    }

    fn snapshot(instructors: Vec<Instructor>, loads: Vec<Load>) -> Snapshot {
        Snapshot {
            instructors,
            loads,
            ledger: Vec::new(),
            period: Period::open("p1", "Today", 0),
            settings: Settings::default(),
        }
    }

    fn plan(snap: &Snapshot, student: &QueueStudent, overrides: &Overrides) -> AssignResult<Plan> {
        plan_assignment(snap, &EngineConfig::default(), student, overrides, true, 100)
    }

    #[test]
    fn picks_lowest_balance_and_first_load() {
        let mut snap = snapshot(
            vec![tandem_instructor("a"), tandem_instructor("b")],
            vec![Load::new("l2", 2, "otter"), Load::new("l1", 1, "otter")],
        );
        snap.ledger.push(Assignment {
            id: "old".to_string(),
            student_id: "x".to_string(),
            student_name: "X".to_string(),
            student_weight: 150,
            instructor_id: "a".to_string(),
            covering_for: None,
            video_instructor_id: None,
            load_id: None,
            jump: Jump::tandem(),
            missed: false,
            queued_at: 1,
            assigned_at: 1,
            reverted_at: None,
        });

        let plan = plan(&snap, &student(Jump::tandem()), &Overrides::default()).unwrap();
        assert_eq!(plan.assignment.instructor_id, "b");
        assert_eq!(plan.target, CommitTarget::Load("l1".to_string()));
        assert_eq!(plan.assignment.queued_at, 42);
        assert_eq!(plan.assignment.assigned_at, 100);
        assert!(plan.dequeue);
    }

    #[test]
    fn no_eligible_instructor() {
        let mut off = tandem_instructor("a");
        off.clocked_in = false;
        let snap = snapshot(vec![off], vec![Load::new("l1", 1, "otter")]);

        let err = plan(&snap, &student(Jump::tandem()), &Overrides::default()).unwrap_err();
        assert!(matches!(err, AssignError::NoQualifiedInstructor(_)));
    }

    #[test]
    fn no_load_with_room() {
        let mut full = Load::new("l1", 1, "otter");
        full.capacity = Some(1);
        let snap = snapshot(vec![tandem_instructor("a")], vec![full]);

        let err = plan(&snap, &student(Jump::tandem()), &Overrides::default()).unwrap_err();
        assert!(matches!(err, AssignError::NoAvailableLoad(_)));
    }

    #[test]
    fn explicit_instructor_must_be_eligible() {
        let mut heavy_limit = tandem_instructor("a");
        heavy_limit.weight_limits.tandem_max = Some(150);
        let snap = snapshot(vec![heavy_limit], vec![Load::new("l1", 1, "otter")]);
        let overrides = Overrides {
            instructor_id: Some("a".to_string()),
            ..Default::default()
        };

        let err = plan(&snap, &student(Jump::tandem()), &overrides).unwrap_err();
        assert!(matches!(err, AssignError::NoQualifiedInstructor(_)));

        let overrides = Overrides {
            instructor_id: Some("ghost".to_string()),
            ..Default::default()
        };
        let err = plan(&snap, &student(Jump::tandem()), &overrides).unwrap_err();
        assert!(matches!(err, AssignError::InstructorNotFound(_)));
    }

    #[test]
    fn explicit_load_must_be_candidate() {
        let mut departed = Load::new("l1", 1, "otter");
        departed.status = dropzone_state::LoadStatus::Departed;
        let snap = snapshot(
            vec![tandem_instructor("a")],
            vec![departed, Load::new("l2", 2, "otter")],
        );

        let overrides = Overrides {
            load_id: Some("l1".to_string()),
            ..Default::default()
        };
        let err = plan(&snap, &student(Jump::tandem()), &overrides).unwrap_err();
        assert!(matches!(err, AssignError::NoAvailableLoad(_)));

        let overrides = Overrides {
            load_id: Some("l9".to_string()),
            ..Default::default()
        };
        let err = plan(&snap, &student(Jump::tandem()), &overrides).unwrap_err();
        assert!(matches!(err, AssignError::LoadNotFound(_)));
    }

    #[test]
    fn outside_video_gets_a_distinct_video_flyer() {
        let mut both = tandem_instructor("a");
        both.capabilities.video = true;
        let snap = snapshot(
            vec![both, video_instructor("v")],
            vec![Load::new("l1", 1, "otter")],
        );

        let plan = plan(&snap, &student(video_jump()), &Overrides::default()).unwrap();
        assert_eq!(plan.assignment.instructor_id, "a");
        assert_eq!(plan.assignment.video_instructor_id.as_deref(), Some("v"));
    }

    #[test]
    fn video_range_excludes_heavy_student() {
        let mut v = video_instructor("v");
        v.video_range = Some(WeightRange { min: 100, max: 170 });
        let snap = snapshot(
            vec![tandem_instructor("a"), v],
            vec![Load::new("l1", 1, "otter")],
        );

        let err = plan(&snap, &student(video_jump()), &Overrides::default()).unwrap_err();
        assert!(matches!(err, AssignError::NoQualifiedInstructor(_)));
    }

    #[test]
    fn video_needs_three_seats() {
        let mut load = Load::new("l1", 1, "otter");
        load.capacity = Some(2);
        let snap = snapshot(vec![tandem_instructor("a"), video_instructor("v")], vec![load]);

        let err = plan(&snap, &student(video_jump()), &Overrides::default()).unwrap_err();
        assert!(matches!(err, AssignError::NoAvailableLoad(_)));
    }

    #[test]
    fn covering_credits_the_performer() {
        let mut absent = tandem_instructor("a");
        absent.clocked_in = false;
        let snap = snapshot(
            vec![absent, tandem_instructor("b")],
            vec![Load::new("l1", 1, "otter")],
        );
        let overrides = Overrides {
            instructor_id: Some("b".to_string()),
            covering_for: Some("a".to_string()),
            ..Default::default()
        };

        let plan = plan(&snap, &student(Jump::tandem()), &overrides).unwrap();
        assert_eq!(plan.assignment.instructor_id, "b");
        assert_eq!(plan.assignment.covering_for.as_deref(), Some("a"));
    }

    #[test]
    fn covering_for_clocked_in_instructor_is_rejected() {
        let snap = snapshot(
            vec![tandem_instructor("a"), tandem_instructor("b")],
            vec![Load::new("l1", 1, "otter")],
        );
        let overrides = Overrides {
            instructor_id: Some("b".to_string()),
            covering_for: Some("a".to_string()),
            ..Default::default()
        };

        let err = plan(&snap, &student(Jump::tandem()), &overrides).unwrap_err();
        assert!(matches!(err, AssignError::InvalidRequest(_)));
    }

    #[test]
    fn roster_covering_relation_is_recorded() {
        let mut absent = tandem_instructor("a");
        absent.clocked_in = false;
        let mut cover = tandem_instructor("b");
        cover.covering_for = Some("a".to_string());
        let snap = snapshot(vec![absent, cover], vec![Load::new("l1", 1, "otter")]);

        let plan = plan(&snap, &student(Jump::tandem()), &Overrides::default()).unwrap();
        assert_eq!(plan.assignment.instructor_id, "b");
        assert_eq!(plan.assignment.covering_for.as_deref(), Some("a"));
    }

    #[test]
    fn missed_goes_to_ledger_without_video() {
        let snap = snapshot(vec![tandem_instructor("a")], Vec::new());
        let overrides = Overrides {
            missed: true,
            ..Default::default()
        };

        let plan = plan(&snap, &student(video_jump()), &overrides).unwrap();
        assert_eq!(plan.target, CommitTarget::Ledger);
        assert!(plan.assignment.missed);
        assert!(plan.assignment.load_id.is_none());
        assert!(!plan.assignment.jump.outside_video());
    }

    #[test]
    fn aircraft_qualification_steers_load_choice() {
        let mut caravan_only = tandem_instructor("a");
        caravan_only.aircraft = vec!["caravan".to_string()];
        let snap = snapshot(
            vec![caravan_only],
            vec![Load::new("l1", 1, "otter"), Load::new("l2", 2, "caravan")],
        );

        let plan = plan(&snap, &student(Jump::tandem()), &Overrides::default()).unwrap();
        assert_eq!(plan.target, CommitTarget::Load("l2".to_string()));
    }
}
