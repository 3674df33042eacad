//! Configuration validation
//!
//! The engine assumes sane tunables, so everything is checked once at load
//! time and rejected with the offending key named.

use crate::constants::{thermal, timing};
use crate::data::config::Config;
use crate::data::types::ThresholdLevels;
use crate::error::{PentafanError, Result};

/// Validates that thresholds are finite and strictly increasing
pub fn validate_levels(section: &str, levels: &ThresholdLevels) -> Result<()> {
    let values = levels.as_array();
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(PentafanError::invalid_config(
            format!("{}.lv{}", section, i),
            "must be a finite temperature",
        ));
    }
    for (i, pair) in values.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(PentafanError::invalid_config(
                format!("{}.lv{}", section, i + 1),
                format!("{} must be greater than lv{} ({})", pair[1], i, pair[0]),
            ));
        }
    }
    Ok(())
}

/// Validates a per-cycle duty fraction (0.0-1.0)
pub fn validate_rate(field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PentafanError::invalid_config(field, format!("{} must be within 0.0-1.0", value)));
    }
    Ok(())
}

/// Validates a finite, non-negative quantity
pub fn validate_non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PentafanError::invalid_config(field, format!("{} must be a non-negative number", value)));
    }
    Ok(())
}

/// Validates a hold length in seconds, non-negative and at most `MAX_COOLDOWN_HOLD_SEC`
pub fn validate_duration_secs(field: &str, value: f64) -> Result<()> {
    validate_non_negative(field, value)?;
    if value > thermal::MAX_COOLDOWN_HOLD_SEC {
        return Err(PentafanError::invalid_config(
            field,
            format!("{} exceeds the maximum of {} seconds", value, thermal::MAX_COOLDOWN_HOLD_SEC),
        ));
    }
    Ok(())
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    validate_levels("fan", &cfg.fan)?;
    validate_levels("fan_ssd", &cfg.fan_ssd)?;

    let t = &cfg.thermal;
    validate_non_negative("thermal.hysteresis", t.hysteresis_c)?;
    validate_non_negative("thermal.deadband", t.deadband_c)?;
    validate_duration_secs("thermal.cooldown_hold_sec", t.cooldown_hold_sec)?;
    validate_non_negative("thermal.up_rate_trend_gain", t.up_rate_trend_gain)?;
    if !t.trend_heat_c.is_finite() {
        return Err(PentafanError::invalid_config("thermal.trend_heat", "must be finite"));
    }
    if !t.trend_fast_heat_c.is_finite() {
        return Err(PentafanError::invalid_config("thermal.trend_fast_heat", "must be finite"));
    }
    validate_rate("thermal.max_dc_change", t.max_dc_change_per_cycle)?;
    validate_rate("thermal.up_rate_base", t.up_rate_base_per_cycle)?;
    validate_rate("thermal.up_rate_max", t.up_rate_max_per_cycle)?;
    validate_rate("thermal.down_rate", t.down_rate_per_cycle)?;

    if cfg.pwm.period_us == 0 {
        return Err(PentafanError::invalid_config("pwm.period_us", "must be greater than zero"));
    }
    if cfg.general.interval_ms < timing::MIN_CONTROL_INTERVAL_MS {
        return Err(PentafanError::invalid_config(
            "general.interval_ms",
            format!("must be at least {}", timing::MIN_CONTROL_INTERVAL_MS),
        ));
    }
    Ok(())
}
