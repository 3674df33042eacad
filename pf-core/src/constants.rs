//! Constants and configuration defaults for penta-fan
//!
//! Centralizes paths, hardware parameters and the thermal control defaults.
//! Other modules reference these instead of repeating magic numbers.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Default configuration file
    pub const CONFIG_FILE: &str = "/etc/penta-fan/penta-fan.toml";

    /// Optional KEY=VALUE environment file with hardware addressing overrides
    pub const ENV_FILE: &str = "/etc/penta-fan/penta-fan.env";

    /// CPU thermal zone (millidegrees Celsius)
    pub const CPU_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

    /// Base path for sysfs PWM chips
    pub const PWM_SYSFS_BASE: &str = "/sys/class/pwm";

    /// Prefix of GPIO character devices (`/dev/gpiochipN`)
    pub const GPIO_CHIP_PREFIX: &str = "/dev/gpiochip";

    /// Directory holding block devices probed with smartctl
    pub const DEV_DIR: &str = "/dev";
}

/// PWM generation parameters
pub mod pwm {
    use super::Duration;

    /// PWM period in microseconds (25 kHz, the standard 4-pin fan frequency)
    pub const PERIOD_US: u64 = 40;

    /// PWM period shared by both backends
    pub const PERIOD: Duration = Duration::from_micros(PERIOD_US);

    /// Duty at or below this is treated as "off" by the software backend
    pub const OFF_THRESHOLD: f64 = 0.001;

    /// Duty at or above this is treated as "always on" by the software backend
    pub const FULL_THRESHOLD: f64 = 0.999;

    /// Consumer label reported to the GPIO subsystem
    pub const GPIO_CONSUMER: &str = "penta-fan";

    /// Name of the software PWM waveform thread
    pub const WAVEFORM_THREAD: &str = "pf-pwm-waveform";

    pub const DEFAULT_PWM_CHIP: u32 = 0;
    pub const DEFAULT_PWM_CHANNEL: u32 = 0;
    pub const DEFAULT_GPIO_CHIP: u32 = 0;
    pub const DEFAULT_GPIO_LINE: u32 = 27;

    /// Values for the sysfs `enable` attribute
    pub mod enable {
        pub const DISABLED: u8 = 0;
        pub const ENABLED: u8 = 1;
    }
}

/// Temperature conversion constants
pub mod temperature {
    /// sysfs thermal zones report millidegrees Celsius
    pub const MILLIDEGREE_DIVISOR: f64 = 1000.0;

    /// Exclusive upper bound for a plausible SMART temperature
    pub const DEVICE_TEMP_MAX: i64 = 200;
}

/// Storage device sensing
pub mod sensors {
    use super::Duration;

    /// Drive bays probed with smartctl
    pub const DEVICES: &[&str] = &["sda", "sdb", "sdc", "sdd"];

    /// Upper bound on device readings requested per cycle
    pub const MAX_DEVICES: usize = 8;

    /// smartctl is slow, so device temperatures are only refreshed this often
    pub const DEVICE_CACHE_TTL: Duration = Duration::from_secs(5);

    pub const SMARTCTL: &str = "smartctl";

    /// SMART attribute names that carry the drive temperature
    pub const TEMP_ATTRIBUTES: &[&str] = &[
        "Temperature_Celsius",
        "Airflow_Temperature_Cel",
        "Composite Temperature",
    ];
}

/// Thermal control engine parameters
pub mod thermal {
    /// Ring buffer capacity for the moving average and trend
    pub const HISTORY_SIZE: usize = 10;

    /// Trend is zero until the history holds at least this many samples
    pub const MIN_TREND_SAMPLES: usize = 3;

    /// Dead-band only engages after more than this many stable cycles
    pub const DEADBAND_STABLE_CYCLES: u32 = 5;

    /// Dead-band never swallows a target further than this from the current duty
    pub const DEADBAND_MAX_DUTY_STEP: f64 = 0.15;

    /// Longest accepted cooldown hold in seconds
    pub const MAX_COOLDOWN_HOLD_SEC: f64 = u32::MAX as f64;

    /// Duty for each threshold level, lv0..lv3
    pub const LEVEL_DUTIES: [f64; 4] = [0.25, 0.50, 0.75, 1.00];
}

/// Default configuration values
pub mod defaults {
    /// CPU thresholds lv0..lv3 in °C
    pub const CPU_LEVELS: [f64; 4] = [55.0, 62.0, 70.0, 78.0];

    /// Storage thresholds lv0..lv3 in °C
    pub const SSD_LEVELS: [f64; 4] = [45.0, 50.0, 55.0, 60.0];

    pub const HYSTERESIS_C: f64 = 3.0;
    pub const DEADBAND_C: f64 = 1.5;
    pub const TREND_HEAT_C: f64 = 0.3;
    pub const TREND_FAST_HEAT_C: f64 = 1.0;
    /// Legacy per-cycle cap, still honored when smaller than the adaptive up rate
    pub const MAX_DC_CHANGE_PER_CYCLE: f64 = 0.10;
    pub const UP_RATE_BASE_PER_CYCLE: f64 = 0.07;
    pub const UP_RATE_TREND_GAIN: f64 = 0.20;
    pub const UP_RATE_MAX_PER_CYCLE: f64 = 0.30;
    pub const DOWN_RATE_PER_CYCLE: f64 = 0.05;
    pub const COOLDOWN_HOLD_SEC: f64 = 20.0;
}

/// Control loop timing
pub mod timing {
    /// Control cycle period
    pub const CONTROL_INTERVAL_MS: u64 = 1000;

    /// Shortest accepted control cycle period
    pub const MIN_CONTROL_INTERVAL_MS: u64 = 100;

    /// A cycle summary is logged every this many cycles even when nothing changes
    pub const SUMMARY_EVERY_CYCLES: u64 = 30;

    /// Consecutive waveform write failures before the warning repeats
    pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;
}
