//! Simulation driver module.
//!
//! This module provides a software instrument bench for development and
//! testing without physical spectroradiometers.

mod config;
mod driver;
mod meter;

pub use config::{SimulatedMeterConfig, SimulationConfig};
pub use driver::SimulationDriver;

use meter_common::driver::InstrumentDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn InstrumentDriver> {
    Box::new(SimulationDriver::new())
}
