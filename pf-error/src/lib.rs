//! Unified error handling for penta-fan
//!
//! This crate provides the single error type used by the core library and the daemon.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using PentafanError
pub type Result<T> = std::result::Result<T, PentafanError>;

/// Unified error type for all penta-fan operations
#[derive(thiserror::Error, Debug)]
pub enum PentafanError {
    // ============================================================================
    // File System Errors
    // ============================================================================
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Sensor Errors
    // ============================================================================
    #[error("Failed to read temperature from {path}: {reason}")]
    TemperatureRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Sensor command `{command}` failed: {reason}")]
    SensorCommand {
        command: String,
        reason: String,
    },

    // ============================================================================
    // Actuator Errors
    // ============================================================================
    #[error("Failed to read PWM from {path}: {reason}")]
    PwmRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write PWM to {path}: {reason}")]
    PwmWrite {
        path: PathBuf,
        reason: String,
    },

    #[error("GPIO error on {chip} line {line}: {reason}")]
    Gpio {
        chip: PathBuf,
        line: u32,
        reason: String,
    },

    #[error("Fan actuator is not running")]
    ActuatorStopped,

    #[error("Failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        name: String,
        source: io::Error,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl PentafanError {
    /// Create an invalid configuration error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn pwm_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PwmWrite {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = PentafanError::invalid_config("thermal.down_rate", "must be within 0.0-1.0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for thermal.down_rate: must be within 0.0-1.0"
        );
    }
}
