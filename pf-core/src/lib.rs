//! penta-fan Core Library
//!
//! Thermal fan control for a small NAS enclosure: one fan cooling the CPU and
//! a set of SATA/NVMe drives.
//!
//! # Features
//!
//! - **Thermal Engine**: Smoothing, trend detection, hysteresis, dead-band and
//!   asymmetric rate limiting with a cooldown hold
//! - **Sensors**: sysfs thermal zone for the CPU, `smartctl` for the drives
//! - **Fan Actuator**: sysfs hardware PWM or software PWM on a GPIO line
//! - **Configuration**: TOML file with environment overrides for the wiring
//!
//! # Module Structure
//!
//! - `hw/` - Sensors and the fan actuator
//! - `data/` - Data types, configuration, validation
//! - `engine/` - Temperature history and duty cycle computation
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use pf_core::{Config, ThermalEngine, ThermalReading, ThermalState};
//!
//! let engine = ThermalEngine::from_config(&Config::default());
//! let mut state = ThermalState::new();
//!
//! let report = engine.compute_duty_cycle(
//!     &mut state,
//!     ThermalReading::valid(64.0),
//!     &[ThermalReading::valid(41.0)],
//!     Instant::now(),
//! );
//! assert!(report.duty > 0.0 && report.duty <= 1.0);
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod error;

pub use data::{
    max_reading, Config, ControlMode, GeneralConfig, PwmConfig, ThermalReading, ThermalTunables,
    ThresholdLevels,
};

pub use data::{collect_env_overrides, load_env_file, parse_env_file, ENV_OVERRIDE_KEYS};

pub use data::{validate_config, validate_duration_secs, validate_levels, validate_non_negative, validate_rate};

pub use engine::{CycleReport, TempHistory, ThermalEngine, ThermalState};

pub use hw::{
    ActuatorBackend, ActuatorState, DutySink, FanActuator, HardwarePwm, OutputLine, SensorSnapshot,
    SensorSource, SharedDuty, SystemSensors,
};

pub use error::{PentafanError, Result};
