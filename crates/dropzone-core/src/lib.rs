pub mod config;

pub use config::{
    ConfigError, DropzoneConfig, LoadPolicy, RateCard, RotationPolicy, SchedulerConfig,
    TeamModifier, DEFAULT_LOAD_CAPACITY,
};
