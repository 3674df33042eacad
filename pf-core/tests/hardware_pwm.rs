//! Hardware PWM actuator against a fake sysfs tree

use std::fs;
use std::time::Duration;

use pf_core::{FanActuator, HardwarePwm};
use tempfile::TempDir;

fn fake_sysfs() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("pwmchip0/pwm0")).unwrap();
    dir
}

#[test]
fn test_duty_written_as_rounded_nanoseconds() {
    let dir = fake_sysfs();
    let pwm = HardwarePwm::open(dir.path(), 0, 0, Duration::from_micros(40)).unwrap();
    let mut actuator = FanActuator::from_hardware(pwm);

    for duty in [0.0, 0.07, 0.333, 0.45, 0.999, 1.0] {
        actuator.set_duty_cycle(duty).unwrap();
        let written: u64 = fs::read_to_string(dir.path().join("pwmchip0/pwm0/duty_cycle"))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(written, (40_000.0 * duty).round() as u64);

        let read_back = actuator.read_duty_cycle().unwrap();
        assert!((read_back - duty).abs() <= 1.0 / 40_000.0);
    }
}

#[test]
fn test_shutdown_zeroes_and_disables() {
    let dir = fake_sysfs();
    let pwm = HardwarePwm::open(dir.path(), 0, 0, Duration::from_micros(40)).unwrap();
    let mut actuator = FanActuator::from_hardware(pwm);
    actuator.set_duty_cycle(0.8).unwrap();
    actuator.shutdown();

    let channel = dir.path().join("pwmchip0/pwm0");
    assert_eq!(fs::read_to_string(channel.join("duty_cycle")).unwrap(), "0");
    assert_eq!(fs::read_to_string(channel.join("enable")).unwrap(), "0");
    assert!(actuator.set_duty_cycle(0.5).is_err());
}
