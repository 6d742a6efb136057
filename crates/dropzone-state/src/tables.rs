//! redb table definitions for the dropzone state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Waiting students keyed by student id.
pub const QUEUE: TableDefinition<&str, &[u8]> = TableDefinition::new("queue");

/// Instructor roster keyed by instructor id.
pub const INSTRUCTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("instructors");

/// Loads keyed by load id. Committed assignments are embedded in the load.
pub const LOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("loads");

/// Assignments that are not attached to a load (missed jumps, off-load work).
pub const LEDGER: TableDefinition<&str, &[u8]> = TableDefinition::new("ledger");

/// Rotation periods keyed by period id.
pub const PERIODS: TableDefinition<&str, &[u8]> = TableDefinition::new("periods");

/// Single-row settings table, see [`SETTINGS_KEY`].
pub const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

pub const SETTINGS_KEY: &str = "current";
