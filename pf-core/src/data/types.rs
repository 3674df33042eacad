//! Core data types for penta-fan
//!
//! Sensor readings and temperature threshold levels shared by the sensor
//! reader, the config loader and the thermal engine.

use serde::{Deserialize, Serialize};

use crate::constants::thermal::LEVEL_DUTIES;

/// A single temperature sample with its provenance
///
/// Unavailable readings still flow through the engine; they count as 0°C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalReading {
    celsius: f64,
    valid: bool,
}

impl ThermalReading {
    /// A reading taken from a working sensor
    ///
    /// Non-finite values are demoted to unavailable.
    pub fn valid(celsius: f64) -> Self {
        if celsius.is_finite() {
            Self { celsius, valid: true }
        } else {
            Self::unavailable()
        }
    }

    /// Sensor could not be read this cycle
    pub fn unavailable() -> Self {
        Self {
            celsius: 0.0,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn celsius(&self) -> Option<f64> {
        self.valid.then_some(self.celsius)
    }

    /// Value fed to the engine: the temperature, or 0 when unavailable
    pub fn value_or_zero(&self) -> f64 {
        if self.valid {
            self.celsius
        } else {
            0.0
        }
    }
}

/// Hottest of a set of readings, 0 when none are valid
pub fn max_reading(readings: &[ThermalReading]) -> f64 {
    readings
        .iter()
        .map(ThermalReading::value_or_zero)
        .fold(0.0, f64::max)
}

/// Four-level temperature thresholds for one monitored source
///
/// Crossing `lv0` starts the fan at 25%, each further level adds 25%.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLevels {
    pub lv0: f64,
    pub lv1: f64,
    pub lv2: f64,
    pub lv3: f64,
}

impl ThresholdLevels {
    pub const fn from_array(levels: [f64; 4]) -> Self {
        Self {
            lv0: levels[0],
            lv1: levels[1],
            lv2: levels[2],
            lv3: levels[3],
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.lv0, self.lv1, self.lv2, self.lv3]
    }

    /// Step-function duty for a temperature using the thresholds as configured
    pub fn duty_for(&self, temp_c: f64) -> f64 {
        self.duty_with_hysteresis(temp_c, 0.0)
    }

    /// Step-function duty with every threshold lowered by `hysteresis_c`
    ///
    /// Used while not heating so the fan holds its speed through a band below
    /// the point where it switched on.
    pub fn duty_with_hysteresis(&self, temp_c: f64, hysteresis_c: f64) -> f64 {
        self.as_array()
            .iter()
            .zip(LEVEL_DUTIES.iter())
            .rev()
            .find(|(level, _)| temp_c >= *level - hysteresis_c)
            .map(|(_, duty)| *duty)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_levels() -> ThresholdLevels {
        ThresholdLevels::from_array([55.0, 62.0, 70.0, 78.0])
    }

    #[test]
    fn test_step_mapping() {
        let levels = cpu_levels();
        assert_eq!(levels.duty_for(20.0), 0.0);
        assert_eq!(levels.duty_for(55.0), 0.25);
        assert_eq!(levels.duty_for(61.9), 0.25);
        assert_eq!(levels.duty_for(62.0), 0.50);
        assert_eq!(levels.duty_for(70.5), 0.75);
        assert_eq!(levels.duty_for(78.0), 1.00);
        assert_eq!(levels.duty_for(95.0), 1.00);
    }

    #[test]
    fn test_hysteresis_keeps_high_duty_through_band() {
        let levels = cpu_levels();
        // Without hysteresis 76°C is only level 2
        assert_eq!(levels.duty_for(76.0), 0.75);
        // Cooling: full speed holds down to lv3 - hysteresis
        assert_eq!(levels.duty_with_hysteresis(76.0, 3.0), 1.00);
        assert_eq!(levels.duty_with_hysteresis(75.0, 3.0), 1.00);
        assert_eq!(levels.duty_with_hysteresis(74.9, 3.0), 0.75);
    }

    #[test]
    fn test_unavailable_reading_counts_as_zero() {
        let r = ThermalReading::unavailable();
        assert!(!r.is_valid());
        assert_eq!(r.celsius(), None);
        assert_eq!(r.value_or_zero(), 0.0);

        let nan = ThermalReading::valid(f64::NAN);
        assert!(!nan.is_valid());
    }

    #[test]
    fn test_max_reading() {
        let readings = [
            ThermalReading::valid(38.0),
            ThermalReading::unavailable(),
            ThermalReading::valid(41.0),
        ];
        assert_eq!(max_reading(&readings), 41.0);
        assert_eq!(max_reading(&[]), 0.0);
    }
}
