//! Fixed-capacity temperature history
//!
//! Holds the last [`HISTORY_SIZE`] CPU and storage samples side by side. The
//! buffer fills monotonically, then wraps and overwrites the oldest slot.
//!
//! Averages and trends operate on slots by array position, not by age. Until
//! the buffer has wrapped the two orders coincide; afterwards the "older" half
//! is simply the lower half of the array.

use crate::constants::thermal::{HISTORY_SIZE, MIN_TREND_SAMPLES};

#[derive(Debug, Clone)]
pub struct TempHistory {
    cpu: [f64; HISTORY_SIZE],
    device: [f64; HISTORY_SIZE],
    next: usize,
    count: usize,
}

impl TempHistory {
    pub const CAPACITY: usize = HISTORY_SIZE;

    pub fn new() -> Self {
        Self {
            cpu: [0.0; HISTORY_SIZE],
            device: [0.0; HISTORY_SIZE],
            next: 0,
            count: 0,
        }
    }

    /// Record one cycle's CPU and hottest-device temperatures
    pub fn push(&mut self, cpu_c: f64, device_c: f64) {
        self.cpu[self.next] = cpu_c;
        self.device[self.next] = device_c;
        self.next = (self.next + 1) % HISTORY_SIZE;
        if self.count < HISTORY_SIZE {
            self.count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn cpu_samples(&self) -> &[f64] {
        &self.cpu[..self.count]
    }

    pub fn device_samples(&self) -> &[f64] {
        &self.device[..self.count]
    }

    /// Moving average of the CPU samples
    pub fn cpu_average(&self) -> f64 {
        mean(self.cpu_samples())
    }

    /// Moving average of the device samples
    pub fn device_average(&self) -> f64 {
        mean(self.device_samples())
    }

    /// CPU trend, positive while heating
    pub fn cpu_trend(&self) -> f64 {
        trend(self.cpu_samples())
    }

    /// Device trend, positive while heating
    pub fn device_trend(&self) -> f64 {
        trend(self.device_samples())
    }
}

impl Default for TempHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Mean of the newer half minus mean of the older half
///
/// With an odd count the last slot falls outside both halves.
fn trend(samples: &[f64]) -> f64 {
    if samples.len() < MIN_TREND_SAMPLES {
        return 0.0;
    }
    let half = samples.len() / 2;
    let older = &samples[..half];
    let newer = &samples[half..half * 2];
    mean(newer) - mean(older)
}
