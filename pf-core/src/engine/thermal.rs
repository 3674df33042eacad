//! Thermal control engine
//!
//! Turns one cycle of temperature readings into a fan duty cycle. The engine is
//! pure computation: it performs no I/O and never fails. All cross-cycle memory
//! lives in [`ThermalState`], which the caller owns and threads through every
//! call.
//!
//! # Smart mode
//!
//! 1. Push the CPU reading and the hottest device reading into the history
//! 2. Smooth both with a moving average, and compute their trends
//! 3. Map each average to a duty through its threshold levels, lowering the
//!    thresholds by the hysteresis while the source is not heating
//! 4. Hold the previous duty when the system has settled (dead-band)
//! 5. Ramp towards the target: fast and trend-scaled upwards, slowly
//!    downwards, and not at all downwards during the cooldown hold

use std::time::{Duration, Instant};

use crate::constants::thermal::{DEADBAND_MAX_DUTY_STEP, DEADBAND_STABLE_CYCLES};
use crate::data::{max_reading, Config, ControlMode, ThermalReading, ThermalTunables, ThresholdLevels};
use crate::engine::history::TempHistory;

/// Engine memory carried between control cycles
#[derive(Debug, Clone, Default)]
pub struct ThermalState {
    history: TempHistory,
    last_duty_cycle: f64,
    last_cpu_avg: f64,
    last_device_avg: f64,
    stable_cycles: u32,
    hold_until: Option<Instant>,
}

impl ThermalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &TempHistory {
        &self.history
    }

    /// Most recently emitted duty cycle (0.0-1.0)
    pub fn last_duty_cycle(&self) -> f64 {
        self.last_duty_cycle
    }

    /// Consecutive cycles without a duty change
    pub fn stable_cycles(&self) -> u32 {
        self.stable_cycles
    }

    /// Whether downward adjustments are currently suppressed
    pub fn hold_active(&self, now: Instant) -> bool {
        self.hold_until.is_some_and(|until| now < until)
    }

    /// Seed the state as if `duty` had been emitted last cycle
    pub fn with_last_duty(mut self, duty: f64) -> Self {
        self.last_duty_cycle = duty.clamp(0.0, 1.0);
        self
    }

    /// Start a cooldown hold ending at `until`
    pub fn with_hold_until(mut self, until: Instant) -> Self {
        self.hold_until = Some(until);
        self
    }

    fn record_duty(&mut self, duty: f64, now: Instant, hold: Duration) {
        if duty == self.last_duty_cycle {
            self.stable_cycles = self.stable_cycles.saturating_add(1);
        } else {
            self.stable_cycles = 0;
        }
        if duty > self.last_duty_cycle {
            self.hold_until = now.checked_add(hold);
        }
        self.last_duty_cycle = duty;
    }
}

/// Everything the engine derived during one cycle
///
/// Returned alongside the duty so the caller can log without the engine
/// touching any output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub cpu_raw: f64,
    pub device_raw: f64,
    pub cpu_avg: f64,
    pub device_avg: f64,
    pub cpu_trend: f64,
    pub device_trend: f64,
    pub cpu_target: f64,
    pub device_target: f64,
    /// Combined target before dead-band and rate limiting
    pub target: f64,
    /// Duty emitted this cycle
    pub duty: f64,
    pub previous_duty: f64,
    /// Dead-band replaced the target with the previous duty
    pub deadband: bool,
    /// Cooldown hold is in effect after this cycle
    pub hold_active: bool,
    /// Combined trend exceeded the fast-heating threshold
    pub fast_heating: bool,
}

impl CycleReport {
    pub fn changed(&self) -> bool {
        self.duty != self.previous_duty
    }

    /// Short status tags for log lines
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags = Vec::new();
        if self.changed() {
            tags.push("ADJUSTING");
        }
        if self.deadband {
            tags.push("DEADBAND");
        }
        if self.hold_active {
            tags.push("HOLD");
        }
        if self.fast_heating {
            tags.push("FAST-HEAT");
        }
        tags
    }
}

/// Duty cycle computation driven by immutable tunables
#[derive(Debug, Clone)]
pub struct ThermalEngine {
    tunables: ThermalTunables,
    cpu_levels: ThresholdLevels,
    device_levels: ThresholdLevels,
    mode: ControlMode,
    enabled: bool,
}

impl ThermalEngine {
    pub fn new(tunables: ThermalTunables, cpu_levels: ThresholdLevels, device_levels: ThresholdLevels) -> Self {
        Self {
            tunables,
            cpu_levels,
            device_levels,
            mode: ControlMode::Smart,
            enabled: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.thermal, config.fan, config.fan_ssd)
            .with_mode(config.general.mode)
            .with_enabled(config.general.fan_enabled)
    }

    pub fn with_mode(mut self, mode: ControlMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Compute this cycle's duty cycle and update `state`
    ///
    /// Unavailable readings count as 0°C. The result is always within 0.0-1.0.
    pub fn compute_duty_cycle(
        &self,
        state: &mut ThermalState,
        cpu: ThermalReading,
        devices: &[ThermalReading],
        now: Instant,
    ) -> CycleReport {
        let cpu_raw = cpu.value_or_zero();
        let device_raw = max_reading(devices);

        if !self.enabled {
            return CycleReport {
                cpu_raw,
                device_raw,
                cpu_avg: state.last_cpu_avg,
                device_avg: state.last_device_avg,
                cpu_trend: 0.0,
                device_trend: 0.0,
                cpu_target: 0.0,
                device_target: 0.0,
                target: 0.0,
                duty: 0.0,
                previous_duty: 0.0,
                deadband: false,
                hold_active: false,
                fast_heating: false,
            };
        }

        match self.mode {
            ControlMode::Smart => self.smart_cycle(state, cpu_raw, device_raw, now),
            ControlMode::Direct => self.direct_cycle(state, cpu_raw, device_raw),
        }
    }

    fn smart_cycle(&self, state: &mut ThermalState, cpu_raw: f64, device_raw: f64, now: Instant) -> CycleReport {
        let t = &self.tunables;

        state.history.push(cpu_raw, device_raw);
        let cpu_avg = state.history.cpu_average();
        let device_avg = state.history.device_average();
        let cpu_trend = state.history.cpu_trend();
        let device_trend = state.history.device_trend();

        let cpu_target = self.cpu_levels.duty_with_hysteresis(cpu_avg, self.hysteresis_for(cpu_trend));
        let device_target = self
            .device_levels
            .duty_with_hysteresis(device_avg, self.hysteresis_for(device_trend));
        let target = cpu_target.max(device_target);

        let last = state.last_duty_cycle;
        let cpu_delta = cpu_avg - state.last_cpu_avg;
        let device_delta = device_avg - state.last_device_avg;

        let deadband = state.stable_cycles > DEADBAND_STABLE_CYCLES
            && cpu_delta.max(device_delta).abs() < t.deadband_c
            && (target - last).abs() < DEADBAND_MAX_DUTY_STEP;
        let effective_target = if deadband { last } else { target };

        let heat_trend = cpu_trend.max(device_trend);
        let mut change = effective_target - last;
        if change > 0.0 {
            change = change.min(self.up_step(heat_trend));
        } else if change < 0.0 {
            change = if state.hold_active(now) {
                0.0
            } else {
                change.max(-t.down_rate_per_cycle)
            };
        }
        let duty = (last + change).clamp(0.0, 1.0);

        state.record_duty(duty, now, t.cooldown_hold());
        state.last_cpu_avg = cpu_avg;
        state.last_device_avg = device_avg;

        CycleReport {
            cpu_raw,
            device_raw,
            cpu_avg,
            device_avg,
            cpu_trend,
            device_trend,
            cpu_target,
            device_target,
            target,
            duty,
            previous_duty: last,
            deadband,
            hold_active: state.hold_active(now),
            fast_heating: heat_trend > t.trend_fast_heat_c,
        }
    }

    /// Raw readings straight through the thresholds, no smoothing or ramping
    fn direct_cycle(&self, state: &mut ThermalState, cpu_raw: f64, device_raw: f64) -> CycleReport {
        state.history.push(cpu_raw, device_raw);

        let cpu_target = self.cpu_levels.duty_for(cpu_raw);
        let device_target = self.device_levels.duty_for(device_raw);
        let target = cpu_target.max(device_target);
        let last = state.last_duty_cycle;
        let duty = target.clamp(0.0, 1.0);

        state.stable_cycles = if duty == last {
            state.stable_cycles.saturating_add(1)
        } else {
            0
        };
        state.last_duty_cycle = duty;
        state.last_cpu_avg = cpu_raw;
        state.last_device_avg = device_raw;

        CycleReport {
            cpu_raw,
            device_raw,
            cpu_avg: cpu_raw,
            device_avg: device_raw,
            cpu_trend: state.history.cpu_trend(),
            device_trend: state.history.device_trend(),
            cpu_target,
            device_target,
            target,
            duty,
            previous_duty: last,
            deadband: false,
            hold_active: false,
            fast_heating: false,
        }
    }

    fn hysteresis_for(&self, trend: f64) -> f64 {
        if trend > self.tunables.trend_heat_c {
            0.0
        } else {
            self.tunables.hysteresis_c
        }
    }

    /// Largest upward step allowed this cycle
    fn up_step(&self, heat_trend: f64) -> f64 {
        let t = &self.tunables;
        let mut step = t.up_rate_base_per_cycle;
        if heat_trend > 0.0 {
            step += t.up_rate_trend_gain * heat_trend;
        }
        if t.max_dc_change_per_cycle > 0.0 && t.max_dc_change_per_cycle < step {
            step = t.max_dc_change_per_cycle;
        }
        step.min(t.up_rate_max_per_cycle)
    }
}
