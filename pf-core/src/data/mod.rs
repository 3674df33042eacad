//! Data types, configuration, and validation modules

mod config;
mod types;
mod validation;

pub use config::{
    collect_env_overrides, load_env_file, parse_env_file, Config, ControlMode, GeneralConfig,
    PwmConfig, ThermalTunables, ENV_OVERRIDE_KEYS,
};
pub use types::{max_reading, ThermalReading, ThresholdLevels};
pub use validation::{validate_config, validate_duration_secs, validate_levels, validate_non_negative, validate_rate};
