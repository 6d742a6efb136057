//! Domain types for the dropzone state store.
//!
//! These types represent the waiting queue, the instructor roster, the
//! loads under construction, the assignment ledger, rotation periods and
//! operator settings. All types are serializable to/from JSON for storage
//! in redb tables.

use serde::{Deserialize, Serialize};

use dropzone_core::SchedulerConfig;

pub type InstructorId = String;
pub type StudentId = String;
pub type LoadId = String;
pub type AssignmentId = String;
pub type PeriodId = String;

// ── Jumps ─────────────────────────────────────────────────────────

/// Discipline of a jump. Drives the qualification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpType {
    Tandem,
    Aff,
}

impl std::fmt::Display for JumpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JumpType::Tandem => write!(f, "tandem"),
            JumpType::Aff => write!(f, "aff"),
        }
    }
}

/// A jump with its discipline-specific add-ons.
///
/// The same value travels from the queue request into the committed
/// assignment, so seat cost and pay are always derived from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Jump {
    Tandem {
        /// Weight-tax tier, 0 = none.
        #[serde(default)]
        weight_tax: u8,
        #[serde(default)]
        handcam: bool,
        /// An outside video flyer joins the jump and takes a seat.
        #[serde(default)]
        outside_video: bool,
    },
    Aff {
        level: u8,
    },
}

impl Jump {
    pub fn tandem() -> Self {
        Jump::Tandem {
            weight_tax: 0,
            handcam: false,
            outside_video: false,
        }
    }

    pub fn jump_type(&self) -> JumpType {
        match self {
            Jump::Tandem { .. } => JumpType::Tandem,
            Jump::Aff { .. } => JumpType::Aff,
        }
    }

    pub fn outside_video(&self) -> bool {
        matches!(
            self,
            Jump::Tandem {
                outside_video: true,
                ..
            }
        )
    }
}

// ── Instructor ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub tandem: bool,
    pub aff: bool,
    pub video: bool,
}

impl Capabilities {
    pub fn supports(&self, jump_type: JumpType) -> bool {
        match jump_type {
            JumpType::Tandem => self.tandem,
            JumpType::Aff => self.aff,
        }
    }
}

/// Maximum student weight per discipline. `None` means unrestricted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightLimits {
    pub tandem_max: Option<u32>,
    pub aff_max: Option<u32>,
}

impl WeightLimits {
    pub fn limit_for(&self, jump_type: JumpType) -> Option<u32> {
        match jump_type {
            JumpType::Tandem => self.tandem_max,
            JumpType::Aff => self.aff_max,
        }
    }
}

/// Inclusive weight range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightRange {
    pub min: u32,
    pub max: u32,
}

impl WeightRange {
    pub fn contains(&self, weight: u32) -> bool {
        weight >= self.min && weight <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: InstructorId,
    pub name: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub weight_limits: WeightLimits,
    /// Student weights this instructor will fly video for.
    #[serde(default)]
    pub video_range: Option<WeightRange>,
    #[serde(default)]
    pub clocked_in: bool,
    #[serde(default)]
    pub team: Option<String>,
    /// Instructor this one is currently covering for. Reference only.
    #[serde(default)]
    pub covering_for: Option<InstructorId>,
    /// Aircraft this instructor is qualified on. Empty means all.
    #[serde(default)]
    pub aircraft: Vec<String>,
    #[serde(default)]
    pub archived: bool,
}

impl Instructor {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            capabilities: Capabilities::default(),
            weight_limits: WeightLimits::default(),
            video_range: None,
            clocked_in: false,
            team: None,
            covering_for: None,
            aircraft: Vec::new(),
            archived: false,
        }
    }

    pub fn qualified_on(&self, aircraft: &str) -> bool {
        self.aircraft.is_empty() || self.aircraft.iter().any(|a| a == aircraft)
    }
}

// ── Queue ─────────────────────────────────────────────────────────

/// A waiting request in the student queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStudent {
    pub id: StudentId,
    pub name: String,
    /// Weight in pounds.
    pub weight: u32,
    /// Student asked for a specific instructor; auto-assign may skip it.
    #[serde(default)]
    pub is_request: bool,
    #[serde(default)]
    pub group_id: Option<String>,
    pub jump: Jump,
    /// Unix timestamp of submission. Carried into the assignment.
    pub queued_at: u64,
}

// ── Load ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Building,
    Ready,
    Departed,
    Completed,
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStatus::Building => write!(f, "building"),
            LoadStatus::Ready => write!(f, "ready"),
            LoadStatus::Departed => write!(f, "departed"),
            LoadStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunJumper {
    pub id: String,
    pub name: String,
}

/// One aircraft flight being filled.
///
/// Occupancy is never stored; it is recomputed from `assignments` and
/// `fun_jumpers` on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Load {
    pub id: LoadId,
    /// Ordering among open loads, lowest fills first.
    pub position: u32,
    pub aircraft: String,
    pub status: LoadStatus,
    /// Explicit seat capacity; falls back to the aircraft default.
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub fun_jumpers: Vec<FunJumper>,
    pub created_at: u64,
}

impl Load {
    pub fn new(id: &str, position: u32, aircraft: &str) -> Self {
        Self {
            id: id.to_string(),
            position,
            aircraft: aircraft.to_string(),
            status: LoadStatus::Building,
            capacity: None,
            assignments: Vec::new(),
            fun_jumpers: Vec::new(),
            created_at: epoch_secs(),
        }
    }
}

/// Typed partial update applied to a stored load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LoadUpdate {
    AppendAssignment { assignment: Assignment },
    RevertAssignment { assignment_id: AssignmentId, at: u64 },
    AddFunJumper { jumper: FunJumper },
    SetStatus { status: LoadStatus },
}

// ── Assignment ────────────────────────────────────────────────────

/// The committed pairing of a student with an instructor (and usually a load).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub student_id: StudentId,
    pub student_name: String,
    pub student_weight: u32,
    /// Instructor who performs the jump and is credited for it.
    pub instructor_id: InstructorId,
    /// Absent instructor the work was performed on behalf of.
    #[serde(default)]
    pub covering_for: Option<InstructorId>,
    #[serde(default)]
    pub video_instructor_id: Option<InstructorId>,
    #[serde(default)]
    pub load_id: Option<LoadId>,
    pub jump: Jump,
    /// Audit-only record: no seat, no pay.
    #[serde(default)]
    pub missed: bool,
    /// The student's original queue timestamp.
    pub queued_at: u64,
    pub assigned_at: u64,
    /// Soft-delete marker.
    #[serde(default)]
    pub reverted_at: Option<u64>,
}

impl Assignment {
    pub fn is_reverted(&self) -> bool {
        self.reverted_at.is_some()
    }

    /// Counts toward seats and pay.
    pub fn is_effective(&self) -> bool {
        !self.missed && !self.is_reverted()
    }
}

// ── Period ────────────────────────────────────────────────────────

/// A rotation window. Balances only look at assignments inside the active one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub name: String,
    pub started_at: u64,
    #[serde(default)]
    pub ended_at: Option<u64>,
    pub active: bool,
}

impl Period {
    pub fn open(id: &str, name: &str, started_at: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            started_at,
            ended_at: None,
            active: true,
        }
    }

    /// Half-open window check: `[started_at, ended_at)`.
    pub fn contains(&self, ts: u64) -> bool {
        ts >= self.started_at && self.ended_at.is_none_or(|end| ts < end)
    }
}

// ── Settings ──────────────────────────────────────────────────────

/// Live operator settings read by the auto-assign scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub auto_assign: bool,
    pub delay_secs: u64,
    pub skip_requests: bool,
    pub batch_mode: bool,
    pub batch_size: u32,
    /// Team currently due in the rotation.
    #[serde(default)]
    pub team_rotation: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for Settings {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            auto_assign: cfg.auto_assign,
            delay_secs: cfg.delay_secs,
            skip_requests: cfg.skip_requests,
            batch_mode: cfg.batch_mode,
            batch_size: cfg.batch_size,
            team_rotation: None,
        }
    }
}

// ── Change feed ───────────────────────────────────────────────────

/// Which collection a store write touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreChange {
    Queue,
    Instructors,
    Loads,
    Assignments,
    Periods,
    Settings,
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
