//! Meter Common Library
//!
//! This crate provides the shared vocabulary of the meter workspace: the
//! capability tables, the error taxonomy, the instrument driver boundary and
//! configuration loading.
//!
//! # Module Structure
//!
//! - [`capability`] - Symbolic name ↔ driver code tables for the four capability families
//! - [`error`] - Driver error triple, error kinds and the classifier
//! - [`driver`] - `InstrumentDriver` / `MeterHandle` traits and boundary types
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Driver error codes and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use meter_common::prelude::*;
//!
//! let code = ColorSpace::table().code_for_name("CIEXYZ").unwrap();
//! assert_eq!(ColorSpace::from_code(code).unwrap(), ColorSpace::CieXyz);
//! ```

pub mod capability;
pub mod config;
pub mod consts;
pub mod driver;
pub mod error;
pub mod prelude;
