//! # Meter HAL Library
//!
//! Instrument session registry with a pluggable driver architecture.
//!
//! This crate provides the `meter_hal` binary, the session registry and the
//! driver modules. Drivers implement the `InstrumentDriver` / `MeterHandle`
//! traits defined in `meter_common::driver`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Instrument driver implementations
//! - [`session`] - One named instrument, its state machine and cached results
//! - [`registry`] - Thread-safe map of named sessions
//! - [`service`] - `MeterService`, the public operation set
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     meter_hal (single crate)                     │
//! │  ┌──────────────┐    ┌───────────────────┐    ┌───────────────┐  │
//! │  │ MeterService │───►│  SessionRegistry  │    │    Driver     │  │
//! │  │  (validate)  │    │  name → session   │    │   Registry    │  │
//! │  └──────────────┘    └─────────┬─────────┘    └───────┬───────┘  │
//! │                                │ MeterHandle           │ create  │
//! │                                ▼                       ▼         │
//! │                      ┌───────────────────────────────────┐       │
//! │                      │  InstrumentDriver (trait object)  │       │
//! │                      └───────────────────────────────────┘       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use meter_hal::MeterService;
//! use meter_hal::drivers::simulation::SimulationDriver;
//! use std::sync::Arc;
//!
//! let service = MeterService::new(Arc::new(SimulationDriver::new()));
//! service.open("i1pro-1").unwrap();
//! service.set_measurement_mode("i1pro-1", "emissive").unwrap();
//! service.calibrate("i1pro-1", false).unwrap();
//! service.trigger("i1pro-1").unwrap();
//! let xyz = service.read_colorimetry("i1pro-1").unwrap();
//! assert!(xyz.is_finite());
//! ```

#![deny(missing_docs)]

pub mod driver_registry;
pub mod drivers;
pub mod registry;
pub mod service;
pub mod session;

// Re-export key types for convenience
pub use crate::driver_registry::DriverRegistry;
pub use crate::registry::SessionRegistry;
pub use crate::service::{ConfigField, MeterService};
pub use crate::session::{InstrumentSession, Measurement, SessionInfo, SessionState};
