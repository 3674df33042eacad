//! Hardware interaction modules
//!
//! Temperature sensors and the fan actuator with its two PWM backends.

mod hardware_pwm;
mod pwm;
mod sensors;
mod software_pwm;

pub use hardware_pwm::HardwarePwm;
pub use pwm::{clamp_duty, ActuatorBackend, ActuatorState, DutySink, FanActuator, SharedDuty};
pub use sensors::{
    parse_smartctl_output, parse_smartctl_temperature, read_temperature, SensorSnapshot, SensorSource,
    SystemSensors,
};
pub use software_pwm::{GpioLine, OutputLine, SoftwarePwm};
