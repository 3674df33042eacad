//! Software PWM on a GPIO line
//!
//! A dedicated thread bit-bangs the waveform from a [`SharedDuty`]. Setting
//! the duty only stores a value; the thread picks it up on its next period.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use tracing::{debug, warn};

use crate::constants::{paths, pwm, timing};
use crate::error::{PentafanError, Result};
use crate::hw::pwm::SharedDuty;

/// A digital output the waveform thread can toggle
pub trait OutputLine: Send {
    fn set_level(&mut self, high: bool) -> Result<()>;
}

/// A GPIO line requested as output through the character device
pub struct GpioLine {
    handle: LineHandle,
    chip: PathBuf,
    line: u32,
}

impl GpioLine {
    /// Request `/dev/gpiochip<chip>` line `line` as an output, initially low
    pub fn request(chip: u32, line: u32) -> Result<Self> {
        let chip_path = PathBuf::from(format!("{}{}", paths::GPIO_CHIP_PREFIX, chip));
        let gpio_err = |reason: String| PentafanError::Gpio {
            chip: chip_path.clone(),
            line,
            reason,
        };

        let mut gpio_chip = Chip::new(&chip_path).map_err(|e| gpio_err(format!("Cannot open chip: {}", e)))?;
        let handle = gpio_chip
            .get_line(line)
            .and_then(|l| l.request(LineRequestFlags::OUTPUT, 0, pwm::GPIO_CONSUMER))
            .map_err(|e| gpio_err(format!("Cannot request line: {}", e)))?;

        Ok(Self {
            handle,
            chip: chip_path,
            line,
        })
    }
}

impl OutputLine for GpioLine {
    fn set_level(&mut self, high: bool) -> Result<()> {
        self.handle.set_value(u8::from(high)).map_err(|e| PentafanError::Gpio {
            chip: self.chip.clone(),
            line: self.line,
            reason: format!("Failed to set value: {}", e),
        })
    }
}

/// Handle to the running waveform thread
#[derive(Debug)]
pub struct SoftwarePwm {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SoftwarePwm {
    /// Start generating the waveform for `duty` on `line`
    pub fn spawn(mut line: Box<dyn OutputLine>, period: Duration, duty: SharedDuty) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let thread = thread::Builder::new()
            .name(pwm::WAVEFORM_THREAD.to_string())
            .spawn(move || run_waveform(line.as_mut(), period, &duty, &thread_stop))
            .map_err(|source| PentafanError::ThreadSpawn {
                name: pwm::WAVEFORM_THREAD.to_string(),
                source,
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the thread and wait for it; it leaves the line low
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Software PWM thread panicked");
            }
        }
    }
}

impl Drop for SoftwarePwm {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_waveform(line: &mut dyn OutputLine, period: Duration, duty: &SharedDuty, stop: &AtomicBool) {
    let mut consecutive_errors: u32 = 0;

    while !stop.load(Ordering::Relaxed) {
        match waveform_period(line, period, duty.load()) {
            Ok(()) => {
                if consecutive_errors > 0 {
                    debug!(errors = consecutive_errors, "GPIO writes recovered");
                }
                consecutive_errors = 0;
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                if consecutive_errors == 1 || consecutive_errors % timing::MAX_CONSECUTIVE_ERRORS == 0 {
                    warn!(error = %e, consecutive_errors, "Software PWM write failed");
                }
                thread::sleep(period);
            }
        }
    }

    if let Err(e) = line.set_level(false) {
        warn!(error = %e, "Failed to drive fan line low on exit");
    }
}

/// One period of output at `duty`
fn waveform_period(line: &mut dyn OutputLine, period: Duration, duty: f64) -> Result<()> {
    if duty <= pwm::OFF_THRESHOLD {
        line.set_level(false)?;
        thread::sleep(period);
    } else if duty >= pwm::FULL_THRESHOLD {
        line.set_level(true)?;
        thread::sleep(period);
    } else {
        let high = period.mul_f64(duty);
        line.set_level(true)?;
        thread::sleep(high);
        line.set_level(false)?;
        thread::sleep(period.saturating_sub(high));
    }
    Ok(())
}
