//! Instructor ranking for assignment decisions.
//!
//! Candidates are eligible instructors ordered by balance, lowest first,
//! with the instructor id as a stable tie-break. The first ranked
//! instructor who is also qualified on a load with room gets the jump.

use dropzone_core::LoadPolicy;
use dropzone_state::{Instructor, Load};
use tracing::debug;

use crate::balance::{RotationContext, earnings_by_instructor, team_adjusted};
use crate::capacity::first_load_with_capacity;

/// A ranked candidate.
#[derive(Debug, Clone)]
pub struct RankedInstructor<'a> {
    pub instructor: &'a Instructor,
    pub balance: i64,
}

/// Rank `candidates` by balance (best first).
pub fn rank_instructors<'a>(
    candidates: &[&'a Instructor],
    ctx: &RotationContext<'_>,
) -> Vec<RankedInstructor<'a>> {
    let earned = earnings_by_instructor(ctx);
    let mut ranked: Vec<RankedInstructor<'a>> = candidates
        .iter()
        .map(|&inst| {
            let raw = earned.get(inst.id.as_str()).copied().unwrap_or(0);
            RankedInstructor {
                instructor: inst,
                balance: team_adjusted(inst, raw, ctx),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.balance
            .cmp(&b.balance)
            .then_with(|| a.instructor.id.cmp(&b.instructor.id))
    });
    ranked
}

/// The instructor and load picked for a jump.
#[derive(Debug, Clone)]
pub struct Pairing<'a> {
    pub instructor: &'a Instructor,
    pub balance: i64,
    pub load: &'a Load,
}

/// Walk the ranking and take the first instructor with a qualifying load.
pub fn pick_pairing<'a>(
    ranked: &[RankedInstructor<'a>],
    loads: &'a [Load],
    seats: u32,
    policy: &LoadPolicy,
) -> Option<Pairing<'a>> {
    ranked.iter().find_map(|r| {
        let load = first_load_with_capacity(loads, seats, policy, |load| {
            r.instructor.qualified_on(&load.aircraft)
        });
        if load.is_none() {
            debug!(
                instructor = %r.instructor.id,
                seats,
                "no qualifying load with room, trying next instructor"
            );
        }
        load.map(|load| Pairing {
            instructor: r.instructor,
            balance: r.balance,
            load,
        })
    })
}
