//! Load capacity model.
//!
//! Seats are never tracked as a running counter. Occupancy is summed from
//! the load's effective assignments and fun jumpers every time it is needed:
//!
//! | Entry | Seats |
//! |---|---|
//! | Tandem | 2 |
//! | Tandem with outside video | 3 |
//! | AFF | 2 |
//! | Fun jumper | 1 |
//! | Missed or reverted assignment | 0 |

use dropzone_core::LoadPolicy;
use dropzone_state::{Assignment, Jump, Load, LoadStatus};

pub const FUN_JUMPER_SEATS: u32 = 1;

/// Seats a jump takes on the aircraft.
pub fn seat_cost(jump: &Jump) -> u32 {
    match jump {
        Jump::Tandem { outside_video, .. } => 2 + u32::from(*outside_video),
        Jump::Aff { .. } => 2,
    }
}

/// Seats an assignment currently holds.
pub fn assignment_seats(assignment: &Assignment) -> u32 {
    if assignment.is_effective() {
        seat_cost(&assignment.jump)
    } else {
        0
    }
}

pub fn occupied_seats(load: &Load) -> u32 {
    let assigned: u32 = load.assignments.iter().map(assignment_seats).sum();
    assigned + FUN_JUMPER_SEATS * load.fun_jumpers.len() as u32
}

pub fn capacity(load: &Load, policy: &LoadPolicy) -> u32 {
    policy.capacity_for(&load.aircraft, load.capacity)
}

/// Free seats. Negative when a load was overfilled outside the engine.
pub fn available_slots(load: &Load, policy: &LoadPolicy) -> i64 {
    i64::from(capacity(load, policy)) - i64::from(occupied_seats(load))
}

pub fn has_capacity(load: &Load, required: u32, policy: &LoadPolicy) -> bool {
    available_slots(load, policy) >= i64::from(required)
}

/// Whether the load's status allows adding work.
pub fn accepts_work(load: &Load, policy: &LoadPolicy) -> bool {
    match load.status {
        LoadStatus::Building => true,
        LoadStatus::Ready => policy.accept_ready,
        LoadStatus::Departed | LoadStatus::Completed => false,
    }
}

/// A load can take `required` more seats right now.
pub fn is_candidate(load: &Load, required: u32, policy: &LoadPolicy) -> bool {
    accepts_work(load, policy) && has_capacity(load, required, policy)
}

/// First candidate load in ascending position order that also passes `filter`.
///
/// No balancing across open loads: the earliest load is filled first.
pub fn first_load_with_capacity<'a, F>(
    loads: &'a [Load],
    required: u32,
    policy: &LoadPolicy,
    mut filter: F,
) -> Option<&'a Load>
where
    F: FnMut(&Load) -> bool,
{
    let mut ordered: Vec<&Load> = loads.iter().collect();
    ordered.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
    ordered
        .into_iter()
        .find(|load| is_candidate(load, required, policy) && filter(load))
}

/// Capacity summary for a single load.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoadOccupancy {
    pub load_id: String,
    pub status: LoadStatus,
    pub capacity: u32,
    pub occupied: u32,
    pub available: i64,
}

pub fn occupancy(load: &Load, policy: &LoadPolicy) -> LoadOccupancy {
    LoadOccupancy {
        load_id: load.id.clone(),
        status: load.status,
        capacity: capacity(load, policy),
        occupied: occupied_seats(load),
        available: available_slots(load, policy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropzone_state::FunJumper;

    fn assignment(id: &str, jump: Jump) -> Assignment {
        Assignment {
            id: id.to_string(),
            student_id: format!("s-{id}"),
            student_name: format!("Student {id}"),
            student_weight: 180,
            instructor_id: "i1".to_string(),
            covering_for: None,
            video_instructor_id: None,
            load_id: Some("l1".to_string()),
            jump,
            missed: false,
            queued_at: 0,
            assigned_at: 0,
            reverted_at: None,
        }
    }

    fn video_tandem() -> Jump {
        Jump::Tandem {
            weight_tax: 0,
            handcam: false,
            outside_video: true,
        }
    }

    fn make_load(position: u32) -> Load {
        let mut load = Load::new(&format!("l{position}"), position, "otter");
        load.created_at = 0;
        load
    }

    #[test]
    fn seat_costs() {
        assert_eq!(seat_cost(&Jump::tandem()), 2);
        assert_eq!(seat_cost(&video_tandem()), 3);
        assert_eq!(seat_cost(&Jump::Aff { level: 1 }), 2);
    }

    #[test]
    fn mixed_load_leaves_three_seats() {
        let mut load = make_load(1);
        load.capacity = Some(18);
        load.assignments.push(assignment("v", video_tandem()));
        for i in 0..5 {
            load.assignments.push(assignment(&format!("t{i}"), Jump::tandem()));
        }
        load.assignments.push(assignment("aff", Jump::Aff { level: 3 }));
        let policy = LoadPolicy::default();

        assert_eq!(occupied_seats(&load), 15);
        assert_eq!(available_slots(&load, &policy), 3);
        assert!(has_capacity(&load, 3, &policy));
        assert!(!has_capacity(&load, 4, &policy));
    }

    #[test]
    fn fun_jumpers_take_one_seat_each() {
        let mut load = make_load(1);
        load.capacity = Some(4);
        load.fun_jumpers.push(FunJumper {
            id: "f1".to_string(),
            name: "Fun".to_string(),
        });
        load.assignments.push(assignment("t", Jump::tandem()));

        let policy = LoadPolicy::default();
        assert_eq!(occupied_seats(&load), 3);
        assert!(has_capacity(&load, 1, &policy));
        assert!(!has_capacity(&load, 2, &policy));
    }

    #[test]
    fn reverted_and_missed_hold_no_seats() {
        let mut load = make_load(1);
        let mut reverted = assignment("r", Jump::tandem());
        reverted.reverted_at = Some(10);
        let mut missed = assignment("m", Jump::tandem());
        missed.missed = true;
        load.assignments.push(reverted);
        load.assignments.push(missed);

        assert_eq!(occupied_seats(&load), 0);
        assert_eq!(available_slots(&load, &LoadPolicy::default()), 18);
    }

    #[test]
    fn overfilled_load_reports_negative_slots() {
        let mut load = make_load(1);
        load.capacity = Some(2);
        load.assignments.push(assignment("v", video_tandem()));
        assert_eq!(available_slots(&load, &LoadPolicy::default()), -1);
    }

    #[test]
    fn aircraft_default_capacity_applies() {
        let mut policy = LoadPolicy::default();
        policy.aircraft.insert("caravan".to_string(), 14);
        let mut load = make_load(1);
        load.aircraft = "caravan".to_string();
        assert_eq!(capacity(&load, &policy), 14);
    }

    #[test]
    fn only_building_loads_accept_work_by_default() {
        let mut load = make_load(1);
        let mut policy = LoadPolicy::default();
        assert!(is_candidate(&load, 2, &policy));

        load.status = LoadStatus::Ready;
        assert!(!is_candidate(&load, 2, &policy));
        policy.accept_ready = true;
        assert!(is_candidate(&load, 2, &policy));

        load.status = LoadStatus::Departed;
        assert!(!is_candidate(&load, 2, &policy));
    }

    #[test]
    fn first_fit_in_position_order() {
        let mut full = make_load(1);
        full.capacity = Some(2);
        full.assignments.push(assignment("t", Jump::tandem()));
        let second = make_load(2);
        let third = make_load(3);
        // Stored out of order on purpose.
        let loads = vec![third, full, second];
        let policy = LoadPolicy::default();

        let chosen = first_load_with_capacity(&loads, 2, &policy, |_| true).unwrap();
        assert_eq!(chosen.id, "l2");

        let chosen = first_load_with_capacity(&loads, 2, &policy, |l| l.id != "l2").unwrap();
        assert_eq!(chosen.id, "l3");

        assert!(first_load_with_capacity(&loads, 2, &policy, |_| false).is_none());
    }

    #[test]
    fn occupancy_summary() {
        let mut load = make_load(1);
        load.assignments.push(assignment("t", Jump::tandem()));
        let summary = occupancy(&load, &LoadPolicy::default());
        assert_eq!(summary.capacity, 18);
        assert_eq!(summary.occupied, 2);
        assert_eq!(summary.available, 16);
    }
}
