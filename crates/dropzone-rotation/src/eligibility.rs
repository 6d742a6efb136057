//! Instructor eligibility filter.
//!
//! Aircraft qualification is not checked here; it is applied when a load
//! is chosen (see [`crate::capacity::first_load_with_capacity`]).

use dropzone_state::{Instructor, JumpType};

/// Clocked in, not archived, holds the rating and can carry the weight.
pub fn is_eligible(instructor: &Instructor, jump_type: JumpType, student_weight: u32) -> bool {
    if !instructor.clocked_in || instructor.archived {
        return false;
    }
    if !instructor.capabilities.supports(jump_type) {
        return false;
    }
    match instructor.weight_limits.limit_for(jump_type) {
        Some(max) => student_weight <= max,
        None => true,
    }
}

pub fn eligible<'a>(
    instructors: &'a [Instructor],
    jump_type: JumpType,
    student_weight: u32,
) -> Vec<&'a Instructor> {
    instructors
        .iter()
        .filter(|i| is_eligible(i, jump_type, student_weight))
        .collect()
}

/// Can fly outside video for a student of this weight.
pub fn is_video_eligible(instructor: &Instructor, student_weight: u32) -> bool {
    instructor.clocked_in
        && !instructor.archived
        && instructor.capabilities.video
        && instructor
            .video_range
            .is_none_or(|range| range.contains(student_weight))
}

pub fn eligible_video(instructors: &[Instructor], student_weight: u32) -> Vec<&Instructor> {
    instructors
        .iter()
        .filter(|i| is_video_eligible(i, student_weight))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropzone_state::WeightRange;

    fn tandem_instructor(id: &str) -> Instructor {
        let mut inst = Instructor::new(id, id);
        inst.capabilities.tandem = true;
        inst.clocked_in = true;
        inst
    }

    #[test]
    fn clocked_out_is_never_eligible() {
        let mut inst = tandem_instructor("i1");
        inst.capabilities.aff = true;
        inst.capabilities.video = true;
        inst.clocked_in = false;

        assert!(!is_eligible(&inst, JumpType::Tandem, 150));
        assert!(!is_eligible(&inst, JumpType::Aff, 150));
        assert!(!is_video_eligible(&inst, 150));
    }

    #[test]
    fn archived_is_never_eligible() {
        let mut inst = tandem_instructor("i1");
        inst.archived = true;
        assert!(!is_eligible(&inst, JumpType::Tandem, 150));
    }

    #[test]
    fn capability_must_match_jump_type() {
        let inst = tandem_instructor("i1");
        assert!(is_eligible(&inst, JumpType::Tandem, 150));
        assert!(!is_eligible(&inst, JumpType::Aff, 150));
    }

    #[test]
    fn discipline_weight_limit_is_inclusive() {
        let mut inst = tandem_instructor("i1");
        inst.weight_limits.tandem_max = Some(220);
        assert!(is_eligible(&inst, JumpType::Tandem, 220));
        assert!(!is_eligible(&inst, JumpType::Tandem, 221));
    }

    #[test]
    fn video_range_bounds() {
        let mut inst = tandem_instructor("v1");
        inst.capabilities.video = true;
        assert!(is_video_eligible(&inst, 300));

        inst.video_range = Some(WeightRange { min: 100, max: 200 });
        assert!(is_video_eligible(&inst, 100));
        assert!(is_video_eligible(&inst, 200));
        assert!(!is_video_eligible(&inst, 201));
    }

    #[test]
    fn filter_keeps_roster_order() {
        let mut off = tandem_instructor("b");
        off.clocked_in = false;
        let roster = vec![tandem_instructor("a"), off, tandem_instructor("c")];

        let ids: Vec<&str> = eligible(&roster, JumpType::Tandem, 180)
            .into_iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(eligible_video(&roster, 180).is_empty());
    }
}
