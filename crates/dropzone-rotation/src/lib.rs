//! Fair rotation rules for the dropzone assignment engine.
//!
//! Everything here is a pure function over a snapshot of the roster, loads
//! and ledger. The scheduler crate owns I/O and timing; this crate only
//! answers "who is next and where do they go".
//!
//! # Components
//!
//! - **`capacity`** — Seat costs, load occupancy, first-fit load selection
//! - **`eligibility`** — Which instructors may take a jump
//! - **`balance`** — Per-period earnings and team rotation modifier
//! - **`ranking`** — Lowest-balance ordering and instructor/load pairing

pub mod balance;
pub mod capacity;
pub mod eligibility;
pub mod ranking;

pub use balance::{BalanceEntry, BalanceSheet, RotationContext, balance, balances, primary_earnings};
pub use capacity::{
    LoadOccupancy, available_slots, first_load_with_capacity, has_capacity, is_candidate,
    occupancy, occupied_seats, seat_cost,
};
pub use eligibility::{eligible, eligible_video, is_eligible, is_video_eligible};
pub use ranking::{Pairing, RankedInstructor, pick_pairing, rank_instructors};
