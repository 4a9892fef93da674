//! Instrument driver implementations.
//!
//! This module contains all instrument driver implementations:
//!
//! - [`simulation`] - Software instrument bench for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `InstrumentDriver` and `MeterHandle` from `meter_common::driver`
//! 3. Register the driver in `register_all_drivers()`
//! 4. Add export and documentation

pub mod simulation;

use crate::driver_registry::DriverRegistry;

/// Register all built-in drivers with `registry`.
pub fn register_all_drivers(registry: &mut DriverRegistry) {
    registry.register("simulation", simulation::create_driver);
}
