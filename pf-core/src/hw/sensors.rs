//! Temperature sensor access
//!
//! The CPU temperature comes from a sysfs thermal zone and is read every
//! cycle. Storage temperatures come from `smartctl -A`, which is slow enough
//! that the results are cached for a few seconds.
//!
//! A sensor that cannot be read yields [`ThermalReading::unavailable`] rather
//! than an error; the engine treats it as 0°C.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::constants::{paths, sensors, temperature};
use crate::data::ThermalReading;
use crate::error::{PentafanError, Result};

/// Source of per-cycle temperature readings
pub trait SensorSource: Send + Sync {
    fn read_cpu_temperature(&self) -> ThermalReading;

    /// Up to `max` storage device readings, one per probed device
    fn read_device_temperatures(&self, max: usize) -> Vec<ThermalReading>;

    fn read_snapshot(&self, max_devices: usize) -> SensorSnapshot {
        SensorSnapshot {
            cpu: self.read_cpu_temperature(),
            devices: self.read_device_temperatures(max_devices),
        }
    }
}

/// All readings taken in one control cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub cpu: ThermalReading,
    pub devices: Vec<ThermalReading>,
}

/// Read a sysfs thermal zone in degrees Celsius
///
/// The kernel reports millidegrees (e.g., 45000 = 45.0°C).
pub fn read_temperature(temp_path: &Path) -> Result<f64> {
    let content = fs::read_to_string(temp_path).map_err(|e| PentafanError::TemperatureRead {
        path: temp_path.to_path_buf(),
        reason: format!("Failed to read: {}", e),
    })?;

    let millidegrees = content.trim().parse::<i64>().map_err(|e| PentafanError::TemperatureRead {
        path: temp_path.to_path_buf(),
        reason: format!("Failed to parse '{}': {}", content.trim(), e),
    })?;

    Ok(millidegrees as f64 / temperature::MILLIDEGREE_DIVISOR)
}

/// Extract a drive temperature from one line of `smartctl -A` output
///
/// Only lines naming a temperature attribute are considered. The value is the
/// last whitespace-separated integer field within (0, 200), so the raw value
/// column wins over the normalized ones and annotations such as
/// `(Min/Max 20/45)` are skipped.
pub fn parse_smartctl_temperature(line: &str) -> Option<f64> {
    if !sensors::TEMP_ATTRIBUTES.iter().any(|attr| line.contains(attr)) {
        return None;
    }
    line.split_whitespace()
        .rev()
        .filter_map(|field| field.parse::<i64>().ok())
        .find(|t| *t > 0 && *t < temperature::DEVICE_TEMP_MAX)
        .map(|t| t as f64)
}

/// First temperature found in a full `smartctl -A` report
pub fn parse_smartctl_output(output: &str) -> Option<f64> {
    output.lines().find_map(parse_smartctl_temperature)
}

/// Sensors of the host system
pub struct SystemSensors {
    cpu_path: PathBuf,
    dev_dir: PathBuf,
    devices: Vec<String>,
    smartctl: PathBuf,
    cache_ttl: Duration,
    cache: Mutex<Option<DeviceCache>>,
}

struct DeviceCache {
    taken: Instant,
    readings: Vec<ThermalReading>,
}

impl SystemSensors {
    pub fn new() -> Self {
        Self::with_paths(
            PathBuf::from(paths::CPU_THERMAL_ZONE),
            PathBuf::from(paths::DEV_DIR),
            sensors::DEVICES.iter().map(|d| d.to_string()).collect(),
            PathBuf::from(sensors::SMARTCTL),
        )
    }

    /// Sensors rooted at custom locations
    pub fn with_paths(cpu_path: PathBuf, dev_dir: PathBuf, devices: Vec<String>, smartctl: PathBuf) -> Self {
        Self {
            cpu_path,
            dev_dir,
            devices,
            smartctl,
            cache_ttl: sensors::DEVICE_CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn query_device(&self, device: &str) -> Result<Option<f64>> {
        let dev_path = self.dev_dir.join(device);
        let command = format!("{} -A {}", self.smartctl.display(), dev_path.display());
        let output = Command::new(&self.smartctl)
            .arg("-A")
            .arg(&dev_path)
            .output()
            .map_err(|e| PentafanError::SensorCommand {
                command,
                reason: e.to_string(),
            })?;

        // smartctl encodes warnings in its exit status, so the output is parsed regardless
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_smartctl_output(&stdout))
    }

    fn probe_devices(&self, max: usize) -> Vec<ThermalReading> {
        self.devices
            .iter()
            .take(max)
            .map(|device| match self.query_device(device) {
                Ok(Some(celsius)) => ThermalReading::valid(celsius),
                Ok(None) => {
                    debug!(device = %device, "No temperature reported");
                    ThermalReading::unavailable()
                }
                Err(e) => {
                    warn!(device = %device, error = %e, "Storage temperature unavailable");
                    ThermalReading::unavailable()
                }
            })
            .collect()
    }
}

impl Default for SystemSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SystemSensors {
    fn read_cpu_temperature(&self) -> ThermalReading {
        match read_temperature(&self.cpu_path) {
            Ok(celsius) => ThermalReading::valid(celsius),
            Err(e) => {
                warn!(error = %e, "CPU temperature unavailable");
                ThermalReading::unavailable()
            }
        }
    }

    fn read_device_temperatures(&self, max: usize) -> Vec<ThermalReading> {
        let expected = self.devices.len().min(max);
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.taken.elapsed() < self.cache_ttl && cached.readings.len() == expected {
                return cached.readings.clone();
            }
        }

        let readings = self.probe_devices(max);
        *cache = Some(DeviceCache {
            taken: Instant::now(),
            readings: readings.clone(),
        });
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const SATA_REPORT: &str = "\
ID# ATTRIBUTE_NAME          FLAG     VALUE WORST THRESH TYPE      UPDATED  WHEN_FAILED RAW_VALUE
  9 Power_On_Hours          0x0032   099   099   000    Old_age   Always       -       4521
190 Airflow_Temperature_Cel 0x0032   062   045   000    Old_age   Always       -       38
194 Temperature_Celsius     0x0022   038   055   000    Old_age   Always       -       38 (Min/Max 20/45)
";

    #[test]
    fn test_parse_sata_attribute_line() {
        let line = "194 Temperature_Celsius     0x0022   036   045   000    Old_age   Always       -       36";
        assert_eq!(parse_smartctl_temperature(line), Some(36.0));
    }

    #[test]
    fn test_parse_skips_min_max_annotation() {
        let line = "194 Temperature_Celsius     0x0022   038   055   000    Old_age   Always       -       38 (Min/Max 20/45)";
        assert_eq!(parse_smartctl_temperature(line), Some(38.0));
    }

    #[test]
    fn test_parse_nvme_composite() {
        assert_eq!(parse_smartctl_temperature("Composite Temperature:              41 Celsius"), Some(41.0));
    }

    #[test]
    fn test_parse_ignores_other_attributes() {
        assert_eq!(parse_smartctl_temperature("  9 Power_On_Hours   0x0032   099   099   000   4521"), None);
        assert_eq!(parse_smartctl_temperature("Temperature_Celsius 0x0022 0 0 0 -"), None);
    }

    #[test]
    fn test_parse_report_takes_first_match() {
        assert_eq!(parse_smartctl_output(SATA_REPORT), Some(38.0));
        assert_eq!(parse_smartctl_output("smartctl: device not found\n"), None);
    }

    #[test]
    fn test_cpu_temperature_from_thermal_zone() {
        let dir = TempDir::new().unwrap();
        let zone = dir.path().join("temp");
        fs::write(&zone, "48250\n").unwrap();

        let sensors = SystemSensors::with_paths(zone, dir.path().to_path_buf(), vec![], PathBuf::from("/nonexistent"));
        assert_eq!(sensors.read_cpu_temperature(), ThermalReading::valid(48.25));
    }

    #[test]
    fn test_missing_cpu_zone_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let sensors = SystemSensors::with_paths(
            dir.path().join("missing"),
            dir.path().to_path_buf(),
            vec![],
            PathBuf::from("/nonexistent"),
        );
        assert!(!sensors.read_cpu_temperature().is_valid());
    }

    #[test]
    #[serial]
    fn test_device_readings_from_smartctl_and_cache() {
        let dir = TempDir::new().unwrap();
        let calls = dir.path().join("calls");
        let script = dir.path().join("smartctl");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\necho x >> {}\ncase \"$2\" in\n  */sda) echo '194 Temperature_Celsius 0x0022 040 055 000 Old_age Always - 40' ;;\n  *) echo 'no such device' ;;\nesac\n",
                calls.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let sensors = SystemSensors::with_paths(
            dir.path().join("temp"),
            dir.path().to_path_buf(),
            vec!["sda".into(), "sdb".into(), "sdc".into()],
            script,
        );

        let readings = sensors.read_device_temperatures(2);
        assert_eq!(readings, vec![ThermalReading::valid(40.0), ThermalReading::unavailable()]);

        // Served from cache, smartctl not invoked again
        let again = sensors.read_device_temperatures(2);
        assert_eq!(again, readings);
        assert_eq!(fs::read_to_string(&calls).unwrap().lines().count(), 2);
    }

    #[test]
    #[serial]
    fn test_missing_smartctl_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let sensors = SystemSensors::with_paths(
            dir.path().join("temp"),
            dir.path().to_path_buf(),
            vec!["sda".into()],
            dir.path().join("no-smartctl"),
        )
        .with_cache_ttl(Duration::ZERO);

        assert_eq!(sensors.read_device_temperatures(4), vec![ThermalReading::unavailable()]);
    }
}
