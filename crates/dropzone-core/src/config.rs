//! dropzone.toml configuration parser.
//!
//! Every section is optional. Missing sections and fields fall back to the
//! defaults below, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Seat capacity used when neither the load nor the aircraft table sets one.
pub const DEFAULT_LOAD_CAPACITY: u32 = 18;

/// Errors raised by [`DropzoneConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("scheduler.batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("loads.default_capacity must be at least 1")]
    ZeroCapacity,

    #[error("capacity for aircraft {0} must be at least 1")]
    ZeroAircraftCapacity(String),

    #[error("rates.aff_upper_from_level must be between 2 and 8, got {0}")]
    AffBoundary(u8),

    #[error("rotation.modifier percent must be positive, got {0}")]
    NonPositivePercent(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropzoneConfig {
    pub scheduler: SchedulerConfig,
    pub loads: LoadPolicy,
    pub rates: RateCard,
    pub rotation: RotationPolicy,
}

/// Scheduler defaults. These seed the live settings the first time a store
/// is opened; after that operators change settings through the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub auto_assign: bool,
    /// Countdown length between selecting a student and committing.
    pub delay_secs: u64,
    /// Leave request-flagged students to manual assignment.
    pub skip_requests: bool,
    pub batch_mode: bool,
    pub batch_size: u32,
    /// Period of the driver's re-evaluation tick.
    pub tick_interval_secs: u64,
    /// Retries for the queue-removal half of a commit.
    pub write_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_assign: true,
            delay_secs: 5,
            skip_requests: true,
            batch_mode: false,
            batch_size: 3,
            tick_interval_secs: 30,
            write_retries: 2,
        }
    }
}

/// Which loads accept new work and how many seats they have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPolicy {
    pub default_capacity: u32,
    /// Also fill loads that were already marked ready.
    pub accept_ready: bool,
    /// Per-aircraft default capacity, keyed by aircraft name.
    pub aircraft: HashMap<String, u32>,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_LOAD_CAPACITY,
            accept_ready: false,
            aircraft: HashMap::new(),
        }
    }
}

impl LoadPolicy {
    /// Resolve a load's capacity: explicit override, then aircraft default,
    /// then the global default.
    pub fn capacity_for(&self, aircraft: &str, explicit: Option<u32>) -> u32 {
        explicit
            .or_else(|| self.aircraft.get(aircraft).copied())
            .unwrap_or(self.default_capacity)
    }
}

/// Per-jump pay rates, in whole currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateCard {
    pub tandem: i64,
    pub handcam: i64,
    pub outside_video: i64,
    /// Surcharge by weight-tax tier; index 0 is "no tax".
    pub weight_tax: Vec<i64>,
    pub aff_lower: i64,
    pub aff_upper: i64,
    /// First AFF level paid at the upper rate.
    pub aff_upper_from_level: u8,
}

impl Default for RateCard {
    fn default() -> Self {
        Self {
            tandem: 45,
            handcam: 15,
            outside_video: 35,
            weight_tax: vec![0, 10, 20, 35],
            aff_lower: 70,
            aff_upper: 55,
            aff_upper_from_level: 5,
        }
    }
}

impl RateCard {
    /// Surcharge for a weight-tax tier. Tiers past the table pay the top tier.
    pub fn weight_tax_for(&self, tier: u8) -> i64 {
        let idx = usize::from(tier);
        self.weight_tax
            .get(idx)
            .or_else(|| self.weight_tax.last())
            .copied()
            .unwrap_or(0)
    }

    pub fn aff_for(&self, level: u8) -> i64 {
        if level >= self.aff_upper_from_level {
            self.aff_upper
        } else {
            self.aff_lower
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    pub modifier: TeamModifier,
}

/// Adjustment applied to the balance of instructors on the due rotation team.
///
/// A negative offset or a percent below 100 moves the team forward in the
/// rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TeamModifier {
    #[default]
    None,
    Offset { amount: i64 },
    Percent { percent: i64 },
}

impl TeamModifier {
    pub fn apply(&self, balance: i64) -> i64 {
        match *self {
            TeamModifier::None => balance,
            TeamModifier::Offset { amount } => balance.saturating_add(amount),
            TeamModifier::Percent { percent } => balance.saturating_mul(percent) / 100,
        }
    }
}

impl DropzoneConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DropzoneConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn from_file_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.loads.default_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if let Some((name, _)) = self.loads.aircraft.iter().find(|(_, cap)| **cap == 0) {
            return Err(ConfigError::ZeroAircraftCapacity(name.clone()));
        }
        if !(2..=8).contains(&self.rates.aff_upper_from_level) {
            return Err(ConfigError::AffBoundary(self.rates.aff_upper_from_level));
        }
        if let TeamModifier::Percent { percent } = self.rotation.modifier {
            if percent <= 0 {
                return Err(ConfigError::NonPositivePercent(percent));
            }
        }
        Ok(())
    }

    /// Scaffold a starting dropzone.toml with a typical single-aircraft setup.
    pub fn scaffold() -> Self {
        let mut aircraft = HashMap::new();
        aircraft.insert("caravan".to_string(), 14);
        aircraft.insert("otter".to_string(), 22);
        DropzoneConfig {
            scheduler: SchedulerConfig::default(),
            loads: LoadPolicy {
                aircraft,
                ..Default::default()
            },
            rates: RateCard::default(),
            rotation: RotationPolicy {
                modifier: TeamModifier::Offset { amount: -25 },
            },
        }
    }
}
