//! Collaborators, engine configuration and read snapshots.

use std::sync::Arc;

use dropzone_core::{DropzoneConfig, LoadPolicy, RateCard, TeamModifier};
use dropzone_rotation::RotationContext;
use dropzone_state::{
    Assignment, AssignmentLedger, Instructor, InstructorRepository, Load, LoadRepository, Period,
    PeriodProvider, QueueRepository, Settings, SettingsProvider, StateStore,
};

use crate::error::{AssignError, AssignResult};
use crate::notify::NotificationSink;

/// The external services the engine reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn QueueRepository>,
    pub instructors: Arc<dyn InstructorRepository>,
    pub loads: Arc<dyn LoadRepository>,
    pub ledger: Arc<dyn AssignmentLedger>,
    pub settings: Arc<dyn SettingsProvider>,
    pub periods: Arc<dyn PeriodProvider>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Collaborators {
    /// Every repository served by one store.
    pub fn from_store(store: StateStore, notifier: Arc<dyn NotificationSink>) -> Self {
        let store = Arc::new(store);
        Self {
            queue: store.clone(),
            instructors: store.clone(),
            loads: store.clone(),
            ledger: store.clone(),
            settings: store.clone(),
            periods: store,
            notifier,
        }
    }
}

/// Static engine configuration taken from `dropzone.toml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub loads: LoadPolicy,
    pub rates: RateCard,
    pub modifier: TeamModifier,
    /// Extra attempts for the queue removal after a successful append.
    pub write_retries: u32,
}

impl From<&DropzoneConfig> for EngineConfig {
    fn from(cfg: &DropzoneConfig) -> Self {
        Self {
            loads: cfg.loads.clone(),
            rates: cfg.rates.clone(),
            modifier: cfg.rotation.modifier,
            write_retries: cfg.scheduler.write_retries,
        }
    }
}

/// Everything a plan is computed from, read in one go.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub instructors: Vec<Instructor>,
    pub loads: Vec<Load>,
    pub ledger: Vec<Assignment>,
    pub period: Period,
    pub settings: Settings,
}

impl Snapshot {
    pub async fn capture(collab: &Collaborators) -> AssignResult<Self> {
        let period = collab
            .periods
            .active_period()
            .await?
            .ok_or(AssignError::NoActivePeriod)?;
        Ok(Self {
            instructors: collab.instructors.list_instructors().await?,
            loads: collab.loads.list_loads().await?,
            ledger: collab.ledger.list_assignments().await?,
            settings: collab.settings.settings().await?,
            period,
        })
    }

    pub fn rotation<'a>(&'a self, config: &'a EngineConfig) -> RotationContext<'a> {
        RotationContext {
            assignments: &self.ledger,
            instructors: &self.instructors,
            period: &self.period,
            loads: &self.loads,
            team_rotation: self.settings.team_rotation.as_deref(),
            rates: &config.rates,
            modifier: config.modifier,
        }
    }

    pub fn instructor(&self, id: &str) -> Option<&Instructor> {
        self.instructors.iter().find(|i| i.id == id)
    }

    pub fn load(&self, id: &str) -> Option<&Load> {
        self.loads.iter().find(|l| l.id == id)
    }
}
