//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use meter_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use meter_common::prelude::*;
//! ```

// ─── Capabilities ───────────────────────────────────────────────────
pub use crate::capability::{
    Capability, CapabilityError, CapabilityNames, ColorSpace, Illuminant, MeasurementMode,
    Observer,
};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, MeterConfig, SessionDefaults};

// ─── Driver boundary ────────────────────────────────────────────────
pub use crate::driver::{
    CalibrationTimes, DriverFactory, InstrumentDriver, MeterHandle, MeterIdentity,
    SpectralCapabilities, Tristimulus,
};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{classify, DriverError, ErrorKind, MeterError};

/// Result alias for session operations.
pub type MeterResult<T> = Result<T, MeterError>;
