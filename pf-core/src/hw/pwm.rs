//! Fan actuator
//!
//! [`FanActuator`] hides which PWM backend drives the fan. The backend is
//! chosen once from an [`ActuatorBackend`] and never switched afterwards.
//!
//! # Lifecycle
//!
//! `new` either returns a running actuator or an error; there is no
//! half-initialized state. `shutdown` drives the fan to 0 and releases the
//! backend, after which `set_duty_cycle` fails with
//! [`PentafanError::ActuatorStopped`]. Dropping a running actuator shuts it
//! down.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::constants::paths;
use crate::error::{PentafanError, Result};
use crate::hw::hardware_pwm::HardwarePwm;
use crate::hw::software_pwm::{GpioLine, OutputLine, SoftwarePwm};

/// Which PWM implementation drives the fan, resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorBackend {
    /// sysfs PWM `pwmchip<chip>/pwm<channel>`
    HardwarePwm { chip: u32, channel: u32, period: Duration },
    /// Bit-banged PWM on `/dev/gpiochip<chip>` line `line`
    SoftwarePwm { chip: u32, line: u32, period: Duration },
}

impl ActuatorBackend {
    pub fn period(&self) -> Duration {
        match self {
            Self::HardwarePwm { period, .. } | Self::SoftwarePwm { period, .. } => *period,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HardwarePwm { .. } => "hardware-pwm",
            Self::SoftwarePwm { .. } => "software-pwm",
        }
    }
}

/// Duty cycle shared between the control loop and the waveform thread
///
/// Stores the `f64` bit pattern in a single atomic word. A reader sees either
/// the old or the new value, never a torn one.
#[derive(Debug, Clone, Default)]
pub struct SharedDuty(Arc<AtomicU64>);

impl SharedDuty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, duty: f64) {
        self.0.store(duty.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Clamp a requested duty to 0.0-1.0, NaN counts as 0
pub fn clamp_duty(duty: f64) -> f64 {
    if duty.is_nan() {
        0.0
    } else {
        duty.clamp(0.0, 1.0)
    }
}

/// Anything the control loop can hand a duty cycle to
pub trait DutySink: Send {
    fn set_duty_cycle(&mut self, duty: f64) -> Result<()>;

    /// Drive the output to 0 and release it
    fn shutdown(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    Running,
    Stopped,
}

enum Driver {
    Hardware(HardwarePwm),
    Software(SoftwarePwm),
}

pub struct FanActuator {
    driver: Driver,
    duty: SharedDuty,
    state: ActuatorState,
}

impl FanActuator {
    /// Initialize the configured backend
    ///
    /// Failure here is fatal for the actuator: nothing is left running.
    pub fn new(backend: &ActuatorBackend) -> Result<Self> {
        let actuator = match *backend {
            ActuatorBackend::HardwarePwm { chip, channel, period } => {
                let pwm = HardwarePwm::open(Path::new(paths::PWM_SYSFS_BASE), chip, channel, period)?;
                Self::from_hardware(pwm)
            }
            ActuatorBackend::SoftwarePwm { chip, line, period } => {
                let gpio = GpioLine::request(chip, line)?;
                Self::from_software(Box::new(gpio), period)?
            }
        };

        info!(
            backend = backend.name(),
            period_us = backend.period().as_micros() as u64,
            "Fan actuator initialized"
        );
        Ok(actuator)
    }

    pub fn from_hardware(pwm: HardwarePwm) -> Self {
        Self {
            driver: Driver::Hardware(pwm),
            duty: SharedDuty::new(),
            state: ActuatorState::Running,
        }
    }

    /// Start a software PWM waveform on an arbitrary output line
    pub fn from_software(line: Box<dyn OutputLine>, period: Duration) -> Result<Self> {
        let duty = SharedDuty::new();
        let pwm = SoftwarePwm::spawn(line, period, duty.clone())?;
        Ok(Self {
            driver: Driver::Software(pwm),
            duty,
            state: ActuatorState::Running,
        })
    }

    /// Set the fan duty cycle (clamped to 0.0-1.0)
    ///
    /// The software backend only stores the value and returns immediately.
    /// On a hardware write failure the previously applied duty stays in effect.
    pub fn set_duty_cycle(&mut self, duty: f64) -> Result<()> {
        if self.state == ActuatorState::Stopped {
            return Err(PentafanError::ActuatorStopped);
        }
        let duty = clamp_duty(duty);
        if let Driver::Hardware(pwm) = &self.driver {
            pwm.apply(duty)?;
        }
        self.duty.store(duty);
        Ok(())
    }

    /// Last duty cycle accepted by `set_duty_cycle`
    pub fn duty_cycle(&self) -> f64 {
        self.duty.load()
    }

    /// Duty cycle currently in effect at the output
    ///
    /// Reads the sysfs attribute back for the hardware backend.
    pub fn read_duty_cycle(&self) -> Result<f64> {
        match &self.driver {
            Driver::Hardware(pwm) => pwm.read_duty_cycle(),
            Driver::Software(_) => Ok(self.duty.load()),
        }
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn backend_name(&self) -> &'static str {
        match self.driver {
            Driver::Hardware(_) => "hardware-pwm",
            Driver::Software(_) => "software-pwm",
        }
    }

    /// Set duty 0 and release the backend; later calls are no-ops
    pub fn shutdown(&mut self) {
        if self.state == ActuatorState::Stopped {
            return;
        }
        self.duty.store(0.0);
        match &mut self.driver {
            Driver::Hardware(pwm) => {
                if let Err(e) = pwm.disable() {
                    warn!(error = %e, "Failed to disable hardware PWM");
                }
            }
            Driver::Software(pwm) => pwm.stop(),
        }
        self.state = ActuatorState::Stopped;
        info!(backend = self.backend_name(), "Fan actuator stopped");
    }
}

impl DutySink for FanActuator {
    fn set_duty_cycle(&mut self, duty: f64) -> Result<()> {
        FanActuator::set_duty_cycle(self, duty)
    }

    fn shutdown(&mut self) {
        FanActuator::shutdown(self)
    }
}

impl Drop for FanActuator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
