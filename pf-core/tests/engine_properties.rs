//! Property tests for the thermal engine invariants

use std::time::{Duration, Instant};

use pf_core::{Config, ControlMode, ThermalEngine, ThermalReading, ThermalState};
use proptest::prelude::*;

const EPS: f64 = 1e-9;

fn reading() -> impl Strategy<Value = ThermalReading> {
    prop_oneof![
        4 => (-20.0f64..130.0).prop_map(ThermalReading::valid),
        1 => Just(ThermalReading::unavailable()),
    ]
}

fn cycle() -> impl Strategy<Value = (ThermalReading, Vec<ThermalReading>, u64)> {
    (reading(), proptest::collection::vec(reading(), 0..5), 0u64..3000)
}

proptest! {
    /// Whatever the readings, the emitted duty stays within 0.0-1.0
    #[test]
    fn duty_always_in_unit_range(cycles in proptest::collection::vec(cycle(), 1..80)) {
        let engine = ThermalEngine::from_config(&Config::default());
        let mut state = ThermalState::new();
        let mut now = Instant::now();

        for (cpu, devices, step_ms) in cycles {
            now += Duration::from_millis(step_ms);
            let report = engine.compute_duty_cycle(&mut state, cpu, &devices, now);
            prop_assert!((0.0..=1.0).contains(&report.duty), "duty {} out of range", report.duty);
            prop_assert_eq!(report.duty, state.last_duty_cycle());
        }
    }

    /// Per-cycle change never exceeds the configured ramp rates
    #[test]
    fn duty_change_is_rate_limited(cycles in proptest::collection::vec(cycle(), 1..80)) {
        let config = Config::default();
        let engine = ThermalEngine::from_config(&config);
        let mut state = ThermalState::new();
        let mut now = Instant::now();

        for (cpu, devices, step_ms) in cycles {
            now += Duration::from_millis(step_ms);
            let report = engine.compute_duty_cycle(&mut state, cpu, &devices, now);
            let change = report.duty - report.previous_duty;
            prop_assert!(change <= config.thermal.up_rate_max_per_cycle + EPS, "rose by {}", change);
            prop_assert!(-change <= config.thermal.down_rate_per_cycle + EPS, "fell by {}", -change);
        }
    }

    /// A duty never drops while the cooldown hold from a recent increase is active
    #[test]
    fn no_decrease_during_hold(cycles in proptest::collection::vec(cycle(), 1..80)) {
        let engine = ThermalEngine::from_config(&Config::default());
        let mut state = ThermalState::new();
        let mut now = Instant::now();

        for (cpu, devices, step_ms) in cycles {
            now += Duration::from_millis(step_ms);
            let held = state.hold_active(now);
            let report = engine.compute_duty_cycle(&mut state, cpu, &devices, now);
            if held {
                prop_assert!(report.duty >= report.previous_duty);
            }
        }
    }

    /// Trend stays exactly zero until three samples have been seen
    #[test]
    fn no_trend_before_three_samples(a in reading(), b in reading()) {
        let engine = ThermalEngine::from_config(&Config::default());
        let mut state = ThermalState::new();
        let now = Instant::now();

        for cpu in [a, b] {
            let report = engine.compute_duty_cycle(&mut state, cpu, &[cpu], now);
            prop_assert_eq!(report.cpu_trend, 0.0);
            prop_assert_eq!(report.device_trend, 0.0);
        }
    }

    /// Direct mode is a pure threshold lookup on the raw readings
    #[test]
    fn direct_mode_matches_threshold_lookup(cpu in 0.0f64..120.0, device in 0.0f64..120.0) {
        let config = Config::default();
        let engine = ThermalEngine::from_config(&config).with_mode(ControlMode::Direct);
        let mut state = ThermalState::new();

        let report = engine.compute_duty_cycle(
            &mut state,
            ThermalReading::valid(cpu),
            &[ThermalReading::valid(device)],
            Instant::now(),
        );
        let expected = config.fan.duty_for(cpu).max(config.fan_ssd.duty_for(device));
        prop_assert_eq!(report.duty, expected);
    }
}
