//! Thermal control engine: history buffer and duty cycle computation

mod history;
mod thermal;

pub use history::TempHistory;
pub use thermal::{CycleReport, ThermalEngine, ThermalState};
