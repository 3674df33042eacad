//! Linux sysfs PWM backend
//!
//! Drives `/sys/class/pwm/pwmchipN/pwmM`. All values are written in
//! nanoseconds: `period` once at init, `duty_cycle` on every change.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::pwm;
use crate::error::{PentafanError, Result};

/// An exported and enabled sysfs PWM channel
#[derive(Debug)]
pub struct HardwarePwm {
    channel_dir: PathBuf,
    period_ns: u64,
}

impl HardwarePwm {
    /// Export (if needed), configure and enable a PWM channel
    ///
    /// The duty cycle is set to 0 before the period so the kernel never sees a
    /// duty longer than the period.
    pub fn open(sysfs_base: &Path, chip: u32, channel: u32, period: Duration) -> Result<Self> {
        let chip_dir = sysfs_base.join(format!("pwmchip{}", chip));
        if !chip_dir.exists() {
            return Err(PentafanError::pwm_write(&chip_dir, "PWM chip not found"));
        }

        let channel_dir = chip_dir.join(format!("pwm{}", channel));
        if !channel_dir.exists() {
            let export = chip_dir.join("export");
            if let Err(e) = fs::write(&export, channel.to_string()) {
                warn!(path = %export.display(), error = %e, "Failed to export PWM channel");
            }
        }
        if !channel_dir.exists() {
            return Err(PentafanError::pwm_write(&channel_dir, "PWM channel not exported"));
        }

        let period_ns = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX);
        if period_ns == 0 {
            return Err(PentafanError::invalid_config("pwm.period_us", "must be greater than zero"));
        }

        let pwm = Self { channel_dir, period_ns };
        pwm.write_attr("duty_cycle", "0")?;
        pwm.write_attr("period", &period_ns.to_string())?;
        pwm.write_attr("enable", &pwm::enable::ENABLED.to_string())?;

        debug!(path = %pwm.channel_dir.display(), period_ns, "Hardware PWM channel enabled");
        Ok(pwm)
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    /// Nanoseconds of high time for a duty cycle
    pub fn duty_ns_for(&self, duty: f64) -> u64 {
        (self.period_ns as f64 * duty.clamp(0.0, 1.0)).round() as u64
    }

    /// Write a duty cycle (0.0-1.0)
    pub fn apply(&self, duty: f64) -> Result<()> {
        let duty_ns = self.duty_ns_for(duty);
        self.write_attr("duty_cycle", &duty_ns.to_string())
    }

    /// Read back the duty cycle the kernel currently holds
    pub fn read_duty_cycle(&self) -> Result<f64> {
        let path = self.channel_dir.join("duty_cycle");
        let content = fs::read_to_string(&path).map_err(|e| PentafanError::PwmRead {
            path: path.clone(),
            reason: format!("Failed to read: {}", e),
        })?;

        let duty_ns = content.trim().parse::<u64>().map_err(|e| PentafanError::PwmRead {
            path: path.clone(),
            reason: format!("Failed to parse '{}': {}", content.trim(), e),
        })?;

        Ok(duty_ns as f64 / self.period_ns as f64)
    }

    /// Stop the output: duty 0, channel disabled
    pub fn disable(&self) -> Result<()> {
        self.write_attr("duty_cycle", "0")?;
        self.write_attr("enable", &pwm::enable::DISABLED.to_string())
    }

    fn write_attr(&self, attr: &str, value: &str) -> Result<()> {
        let path = self.channel_dir.join(attr);
        fs::write(&path, value)
            .map_err(|e| PentafanError::pwm_write(&path, format!("Failed to write {} '{}': {}", attr, value, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_chip(exported: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        let chip = dir.path().join("pwmchip0");
        fs::create_dir_all(&chip).unwrap();
        if exported {
            fs::create_dir_all(chip.join("pwm0")).unwrap();
        }
        dir
    }

    #[test]
    fn test_open_configures_channel() {
        let dir = fake_chip(true);
        let pwm = HardwarePwm::open(dir.path(), 0, 0, Duration::from_micros(40)).unwrap();

        let channel = dir.path().join("pwmchip0/pwm0");
        assert_eq!(fs::read_to_string(channel.join("period")).unwrap(), "40000");
        assert_eq!(fs::read_to_string(channel.join("duty_cycle")).unwrap(), "0");
        assert_eq!(fs::read_to_string(channel.join("enable")).unwrap(), "1");
        assert_eq!(pwm.period_ns(), 40_000);
    }

    #[test]
    fn test_missing_chip_fails() {
        let dir = TempDir::new().unwrap();
        let result = HardwarePwm::open(dir.path(), 3, 0, Duration::from_micros(40));
        assert!(matches!(result, Err(PentafanError::PwmWrite { .. })));
    }

    #[test]
    fn test_unexported_channel_is_exported_then_fails_if_still_missing() {
        let dir = fake_chip(false);
        let result = HardwarePwm::open(dir.path(), 0, 1, Duration::from_micros(40));
        assert!(result.is_err());
        // Export was still attempted
        assert_eq!(fs::read_to_string(dir.path().join("pwmchip0/export")).unwrap(), "1");
    }

    #[test]
    fn test_apply_writes_rounded_nanoseconds() {
        let dir = fake_chip(true);
        let pwm = HardwarePwm::open(dir.path(), 0, 0, Duration::from_micros(40)).unwrap();

        pwm.apply(0.45).unwrap();
        let written = fs::read_to_string(dir.path().join("pwmchip0/pwm0/duty_cycle")).unwrap();
        assert_eq!(written, "18000");

        pwm.apply(1.7).unwrap();
        assert_eq!(pwm.read_duty_cycle().unwrap(), 1.0);
    }

    #[test]
    fn test_disable() {
        let dir = fake_chip(true);
        let pwm = HardwarePwm::open(dir.path(), 0, 0, Duration::from_micros(40)).unwrap();
        pwm.apply(0.5).unwrap();
        pwm.disable().unwrap();

        let channel = dir.path().join("pwmchip0/pwm0");
        assert_eq!(fs::read_to_string(channel.join("duty_cycle")).unwrap(), "0");
        assert_eq!(fs::read_to_string(channel.join("enable")).unwrap(), "0");
    }
}
