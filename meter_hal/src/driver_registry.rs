//! Driver registry for instrument drivers.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving
//! instrument driver factories. This uses constructor-injection rather than
//! global state.

use meter_common::driver::{DriverFactory, InstrumentDriver};
use meter_common::error::MeterError;
use std::collections::HashMap;

/// Registry of available instrument drivers.
///
/// Constructed at startup, populated via `register()`, and consulted by
/// `MeterService::from_config`. No global state, so it is testable in
/// isolation.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in driver.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<DriverFactory> {
        self.factories.get(name).copied()
    }

    /// Create a driver instance by name.
    ///
    /// # Errors
    /// Returns `MeterError::NotFound` if no driver with the given name is registered.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn InstrumentDriver>, MeterError> {
        let factory = self.get_factory(name).ok_or_else(|| {
            MeterError::not_found(format!(
                "driver '{name}' is not registered (available: {})",
                self.list_drivers().join(", ")
            ))
        })?;
        Ok(factory())
    }

    /// List all registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
