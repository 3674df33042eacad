//! Configuration management
//!
//! Loads the TOML configuration once at startup. Every key is optional; missing
//! keys fall back to the defaults in [`crate::constants::defaults`]. Sections
//! this daemon does not use (such as `[oled]`) are ignored.
//!
//! ```toml
//! [fan]
//! lv0 = 55
//! lv1 = 62
//! lv2 = 70
//! lv3 = 78
//!
//! [fan_ssd]
//! lv0 = 45
//! lv1 = 50
//! lv2 = 55
//! lv3 = 60
//!
//! [thermal]
//! hysteresis = 3.0
//! down_rate = 0.05
//! cooldown_hold_sec = 20
//!
//! [pwm]
//! hardware = false
//! gpio_chip = 0
//! gpio_line = 27
//! ```
//!
//! Hardware addressing can also be overridden through environment variables
//! (`HARDWARE_PWM`, `PWMCHIP`, `PWM_CHANNEL`, `FAN_CHIP`, `FAN_LINE`), either
//! from the process environment or from a `KEY=VALUE` env file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{defaults, pwm, thermal, timing};
use crate::data::types::ThresholdLevels;
use crate::data::validation;
use crate::error::{PentafanError, Result};
use crate::hw::ActuatorBackend;

/// Environment keys understood as hardware overrides
pub const ENV_OVERRIDE_KEYS: &[&str] = &["HARDWARE_PWM", "PWMCHIP", "PWM_CHANNEL", "FAN_CHIP", "FAN_LINE"];

/// How the engine turns temperatures into a duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Smoothing, hysteresis, dead-band and rate limiting
    #[default]
    Smart,
    /// Plain threshold lookup on the raw readings
    Direct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// When false the fan is held at 0% regardless of temperature
    pub fan_enabled: bool,
    pub mode: ControlMode,
    /// Control cycle period in milliseconds
    pub interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            fan_enabled: true,
            mode: ControlMode::Smart,
            interval_ms: timing::CONTROL_INTERVAL_MS,
        }
    }
}

/// Thermal control tunables, read-only for the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalTunables {
    /// Threshold shift applied while not heating (°C)
    #[serde(rename = "hysteresis")]
    pub hysteresis_c: f64,
    /// Temperature movement ignored once the duty has settled (°C)
    #[serde(rename = "deadband")]
    pub deadband_c: f64,
    /// Trend above which a source counts as heating (°C over the window)
    #[serde(rename = "trend_heat")]
    pub trend_heat_c: f64,
    /// Trend above which a cycle is flagged as fast heating
    #[serde(rename = "trend_fast_heat")]
    pub trend_fast_heat_c: f64,
    /// Legacy upward cap, only applied when positive and below the adaptive rate
    #[serde(rename = "max_dc_change")]
    pub max_dc_change_per_cycle: f64,
    #[serde(rename = "up_rate_base")]
    pub up_rate_base_per_cycle: f64,
    /// Extra upward step per °C of positive trend
    pub up_rate_trend_gain: f64,
    #[serde(rename = "up_rate_max")]
    pub up_rate_max_per_cycle: f64,
    #[serde(rename = "down_rate")]
    pub down_rate_per_cycle: f64,
    /// Seconds after an increase during which the duty may not drop
    pub cooldown_hold_sec: f64,
}

impl Default for ThermalTunables {
    fn default() -> Self {
        Self {
            hysteresis_c: defaults::HYSTERESIS_C,
            deadband_c: defaults::DEADBAND_C,
            trend_heat_c: defaults::TREND_HEAT_C,
            trend_fast_heat_c: defaults::TREND_FAST_HEAT_C,
            max_dc_change_per_cycle: defaults::MAX_DC_CHANGE_PER_CYCLE,
            up_rate_base_per_cycle: defaults::UP_RATE_BASE_PER_CYCLE,
            up_rate_trend_gain: defaults::UP_RATE_TREND_GAIN,
            up_rate_max_per_cycle: defaults::UP_RATE_MAX_PER_CYCLE,
            down_rate_per_cycle: defaults::DOWN_RATE_PER_CYCLE,
            cooldown_hold_sec: defaults::COOLDOWN_HOLD_SEC,
        }
    }
}

impl ThermalTunables {
    /// Hold length, clamped to `0..=MAX_COOLDOWN_HOLD_SEC`
    pub fn cooldown_hold(&self) -> Duration {
        if self.cooldown_hold_sec.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.cooldown_hold_sec.clamp(0.0, thermal::MAX_COOLDOWN_HOLD_SEC))
    }
}

/// Actuator hardware addressing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    /// Use the sysfs hardware PWM instead of software PWM on a GPIO line
    pub hardware: bool,
    pub pwm_chip: u32,
    pub pwm_channel: u32,
    pub gpio_chip: u32,
    pub gpio_line: u32,
    pub period_us: u64,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            hardware: false,
            pwm_chip: pwm::DEFAULT_PWM_CHIP,
            pwm_channel: pwm::DEFAULT_PWM_CHANNEL,
            gpio_chip: pwm::DEFAULT_GPIO_CHIP,
            gpio_line: pwm::DEFAULT_GPIO_LINE,
            period_us: pwm::PERIOD_US,
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    /// CPU thresholds
    pub fan: ThresholdLevels,
    /// Storage device thresholds
    pub fan_ssd: ThresholdLevels,
    pub thermal: ThermalTunables,
    pub pwm: PwmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            fan: ThresholdLevels::from_array(defaults::CPU_LEVELS),
            fan_ssd: ThresholdLevels::from_array(defaults::SSD_LEVELS),
            thermal: ThermalTunables::default(),
            pwm: PwmConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate the configuration file
    ///
    /// A missing file is not an error: the defaults are used and a warning logged.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| PentafanError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Apply hardware overrides from environment-style variables
    ///
    /// Unknown keys are ignored; malformed values are configuration errors.
    pub fn apply_env_overrides(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        if let Some(v) = vars.get("HARDWARE_PWM") {
            self.pwm.hardware = v.trim() == "1";
        }
        if let Some(v) = vars.get("PWMCHIP") {
            self.pwm.pwm_chip = parse_env_u32("PWMCHIP", v)?;
        }
        if let Some(v) = vars.get("PWM_CHANNEL") {
            self.pwm.pwm_channel = parse_env_u32("PWM_CHANNEL", v)?;
        }
        if let Some(v) = vars.get("FAN_CHIP") {
            self.pwm.gpio_chip = parse_env_u32("FAN_CHIP", v)?;
        }
        if let Some(v) = vars.get("FAN_LINE") {
            self.pwm.gpio_line = parse_env_u32("FAN_LINE", v)?;
        }
        Ok(())
    }

    /// Resolve the actuator backend once from the PWM section
    pub fn actuator_backend(&self) -> ActuatorBackend {
        let period = Duration::from_micros(self.pwm.period_us);
        if self.pwm.hardware {
            ActuatorBackend::HardwarePwm {
                chip: self.pwm.pwm_chip,
                channel: self.pwm.pwm_channel,
                period,
            }
        } else {
            ActuatorBackend::SoftwarePwm {
                chip: self.pwm.gpio_chip,
                line: self.pwm.gpio_line,
                period,
            }
        }
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.general.interval_ms)
    }

    /// Effective configuration as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn parse_env_u32(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|e| PentafanError::invalid_config(key, format!("'{}' is not a valid index: {}", value.trim(), e)))
}

/// Parse `KEY=VALUE` lines; `#` comments and blank lines are skipped
pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        .collect()
}

/// Read an env file, returning no variables when it does not exist
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        debug!("Env file {} not found, skipping", path.display());
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path).map_err(|source| PentafanError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_env_file(&content))
}

/// Collect hardware overrides: env file first, process environment wins
pub fn collect_env_overrides(env_file: &Path) -> Result<HashMap<String, String>> {
    let mut vars: HashMap<String, String> = load_env_file(env_file)?
        .into_iter()
        .filter(|(k, _)| ENV_OVERRIDE_KEYS.contains(&k.as_str()))
        .collect();

    for key in ENV_OVERRIDE_KEYS {
        if let Ok(value) = std::env::var(key) {
            vars.insert((*key).to_string(), value);
        }
    }
    Ok(vars)
}
