//! Balance calculator.
//!
//! An instructor's balance is what they earned in the active period. The
//! rotation serves the lowest balance first, so every function here is pure
//! and cheap enough to call from inside a sort comparator.

use std::collections::{HashMap, HashSet};

use dropzone_core::{RateCard, TeamModifier};
use dropzone_state::{Assignment, Instructor, Jump, Load, Period};

/// Everything a balance depends on, borrowed from one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RotationContext<'a> {
    /// Assignments held in the ledger (no load attached).
    pub assignments: &'a [Assignment],
    pub instructors: &'a [Instructor],
    pub period: &'a Period,
    pub loads: &'a [Load],
    /// Team currently due in the rotation.
    pub team_rotation: Option<&'a str>,
    pub rates: &'a RateCard,
    pub modifier: TeamModifier,
}

/// Pay for the primary job of a jump.
pub fn primary_earnings(jump: &Jump, rates: &RateCard) -> i64 {
    match jump {
        Jump::Tandem {
            weight_tax,
            handcam,
            ..
        } => {
            let handcam = if *handcam { rates.handcam } else { 0 };
            rates.tandem + rates.weight_tax_for(*weight_tax) + handcam
        }
        Jump::Aff { level } => rates.aff_for(*level),
    }
}

/// Effective assignments inside the period, ledger first, then loads in
/// stored order. An assignment present in both is counted once.
pub fn period_assignments<'a>(ctx: &RotationContext<'a>) -> Vec<&'a Assignment> {
    let mut seen: HashSet<&str> = HashSet::new();
    let loads = ctx.loads.iter().flat_map(|l| l.assignments.iter());

    ctx.assignments
        .iter()
        .chain(loads)
        .filter(|a| seen.insert(a.id.as_str()))
        .filter(|a| !a.is_reverted() && ctx.period.contains(a.assigned_at))
        .collect()
}

/// Raw earnings per instructor id, before any team modifier.
pub fn earnings_by_instructor<'a>(ctx: &RotationContext<'a>) -> HashMap<&'a str, i64> {
    let mut earned: HashMap<&'a str, i64> = HashMap::new();
    for a in period_assignments(ctx) {
        if a.missed {
            continue;
        }
        *earned.entry(a.instructor_id.as_str()).or_default() +=
            primary_earnings(&a.jump, ctx.rates);
        if !a.jump.outside_video() {
            continue;
        }
        if let Some(video) = a.video_instructor_id.as_deref() {
            *earned.entry(video).or_default() += ctx.rates.outside_video;
        }
    }
    earned
}

/// Apply the team modifier when the instructor's team is the one due.
pub(crate) fn team_adjusted(
    instructor: &Instructor,
    earned: i64,
    ctx: &RotationContext<'_>,
) -> i64 {
    let due = ctx
        .team_rotation
        .is_some_and(|due| instructor.team.as_deref() == Some(due));
    if due { ctx.modifier.apply(earned) } else { earned }
}

/// Balance of one instructor. Lower means served sooner.
pub fn balance(instructor_id: &str, ctx: &RotationContext<'_>) -> i64 {
    let earned = earnings_by_instructor(ctx)
        .get(instructor_id)
        .copied()
        .unwrap_or(0);
    match ctx.instructors.iter().find(|i| i.id == instructor_id) {
        Some(instructor) => team_adjusted(instructor, earned, ctx),
        None => earned,
    }
}

/// One row of a [`BalanceSheet`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BalanceEntry {
    pub instructor_id: String,
    pub name: String,
    pub team: Option<String>,
    /// Earnings before the team modifier.
    pub earned: i64,
    pub balance: i64,
    pub clocked_in: bool,
}

/// Balances of every non-archived instructor, lowest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BalanceSheet {
    pub period_id: String,
    pub entries: Vec<BalanceEntry>,
}

impl BalanceSheet {
    pub fn get(&self, instructor_id: &str) -> Option<&BalanceEntry> {
        self.entries.iter().find(|e| e.instructor_id == instructor_id)
    }

    pub fn balance_of(&self, instructor_id: &str) -> i64 {
        self.get(instructor_id).map(|e| e.balance).unwrap_or(0)
    }
}

pub fn balances(ctx: &RotationContext<'_>) -> BalanceSheet {
    let earned = earnings_by_instructor(ctx);
    let mut entries: Vec<BalanceEntry> = ctx
        .instructors
        .iter()
        .filter(|i| !i.archived)
        .map(|i| {
            let raw = earned.get(i.id.as_str()).copied().unwrap_or(0);
            BalanceEntry {
                instructor_id: i.id.clone(),
                name: i.name.clone(),
                team: i.team.clone(),
                earned: raw,
                balance: team_adjusted(i, raw, ctx),
                clocked_in: i.clocked_in,
            }
        })
        .collect();
    entries.sort_by(|a, b| {
        a.balance
            .cmp(&b.balance)
            .then_with(|| a.instructor_id.cmp(&b.instructor_id))
    });
    BalanceSheet {
        period_id: ctx.period.id.clone(),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(id: &str, instructor: &str, jump: Jump, at: u64) -> Assignment {
        Assignment {
            id: id.to_string(),
            student_id: format!("s-{id}"),
            student_name: "Student".to_string(),
            student_weight: 180,
            instructor_id: instructor.to_string(),
            covering_for: None,
            video_instructor_id: None,
            load_id: None,
            jump,
            missed: false,
            queued_at: at,
            assigned_at: at,
            reverted_at: None,
        }
    }

    fn instructor(id: &str, team: Option<&str>) -> Instructor {
        let mut i = Instructor::new(id, id);
        i.team = team.map(str::to_string);
        i.clocked_in = true;
        i
    }

    struct Fixture {
        ledger: Vec<Assignment>,
        loads: Vec<Load>,
        instructors: Vec<Instructor>,
        period: Period,
        rates: RateCard,
        team: Option<String>,
        modifier: TeamModifier,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ledger: Vec::new(),
                loads: Vec::new(),
                instructors: vec![instructor("a", Some("red")), instructor("b", None)],
                period: Period::open("p1", "Today", 100),
                rates: RateCard::default(),
                team: None,
                modifier: TeamModifier::None,
            }
        }

        fn ctx(&self) -> RotationContext<'_> {
            RotationContext {
                assignments: &self.ledger,
                instructors: &self.instructors,
                period: &self.period,
                loads: &self.loads,
                team_rotation: self.team.as_deref(),
                rates: &self.rates,
                modifier: self.modifier,
            }
        }
    }

    #[test]
    fn tandem_earnings_include_add_ons() {
        let rates = RateCard::default();
        let jump = Jump::Tandem {
            weight_tax: 2,
            handcam: true,
            outside_video: true,
        };
        assert_eq!(primary_earnings(&jump, &rates), 45 + 20 + 15);
        assert_eq!(primary_earnings(&Jump::tandem(), &rates), 45);
    }

    #[test]
    fn aff_lower_levels_pay_more() {
        let rates = RateCard::default();
        assert_eq!(primary_earnings(&Jump::Aff { level: 1 }, &rates), 70);
        assert_eq!(primary_earnings(&Jump::Aff { level: 5 }, &rates), 55);
    }

    #[test]
    fn no_assignments_means_zero() {
        let fx = Fixture::new();
        assert_eq!(balance("a", &fx.ctx()), 0);
    }

    #[test]
    fn counts_ledger_and_load_assignments_once() {
        let mut fx = Fixture::new();
        let shared = assignment("x1", "a", Jump::tandem(), 150);
        fx.ledger.push(shared.clone());
        let mut load = Load::new("l1", 1, "otter");
        load.assignments.push(shared);
        load.assignments.push(assignment("x2", "a", Jump::Aff { level: 2 }, 160));
        fx.loads.push(load);

        assert_eq!(balance("a", &fx.ctx()), 45 + 70);
    }

    #[test]
    fn outside_period_and_reverted_are_ignored() {
        let mut fx = Fixture::new();
        fx.period.ended_at = Some(200);
        fx.ledger.push(assignment("before", "a", Jump::tandem(), 99));
        fx.ledger.push(assignment("after", "a", Jump::tandem(), 200));
        let mut reverted = assignment("rev", "a", Jump::tandem(), 150);
        reverted.reverted_at = Some(151);
        fx.ledger.push(reverted);
        fx.ledger.push(assignment("in", "a", Jump::tandem(), 150));

        assert_eq!(balance("a", &fx.ctx()), 45);
    }

    #[test]
    fn missed_earns_nothing() {
        let mut fx = Fixture::new();
        let mut missed = assignment("m", "a", Jump::tandem(), 150);
        missed.missed = true;
        fx.ledger.push(missed);
        assert_eq!(balance("a", &fx.ctx()), 0);
    }

    #[test]
    fn covering_credits_performer_only() {
        let mut fx = Fixture::new();
        let mut covered = assignment("c", "b", Jump::tandem(), 150);
        covered.covering_for = Some("a".to_string());
        fx.ledger.push(covered);

        assert_eq!(balance("b", &fx.ctx()), 45);
        assert_eq!(balance("a", &fx.ctx()), 0);
    }

    #[test]
    fn video_fee_goes_to_video_instructor() {
        let mut fx = Fixture::new();
        let mut a = assignment(
            "v",
            "a",
            Jump::Tandem {
                weight_tax: 0,
                handcam: false,
                outside_video: true,
            },
            150,
        );
        a.video_instructor_id = Some("b".to_string());
        fx.ledger.push(a);

        assert_eq!(balance("a", &fx.ctx()), 45);
        assert_eq!(balance("b", &fx.ctx()), 35);
    }

    #[test]
    fn team_modifier_applies_to_due_team_only() {
        let mut fx = Fixture::new();
        fx.ledger.push(assignment("t1", "a", Jump::tandem(), 150));
        fx.ledger.push(assignment("t2", "b", Jump::tandem(), 150));
        fx.modifier = TeamModifier::Offset { amount: -25 };

        assert_eq!(balance("a", &fx.ctx()), 45);

        fx.team = Some("red".to_string());
        assert_eq!(balance("a", &fx.ctx()), 20);
        assert_eq!(balance("b", &fx.ctx()), 45);

        fx.modifier = TeamModifier::Percent { percent: 50 };
        assert_eq!(balance("a", &fx.ctx()), 22);
    }

    #[test]
    fn sheet_sorted_lowest_first() {
        let mut fx = Fixture::new();
        fx.ledger.push(assignment("t1", "a", Jump::tandem(), 150));
        let mut archived = instructor("z", None);
        archived.archived = true;
        fx.instructors.push(archived);

        let sheet = balances(&fx.ctx());
        assert_eq!(sheet.period_id, "p1");
        let ids: Vec<&str> = sheet.entries.iter().map(|e| e.instructor_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(sheet.balance_of("a"), 45);
        assert!(sheet.get("z").is_none());
    }
}
