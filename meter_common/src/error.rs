//! Error taxonomy and driver error classification.
//!
//! This module defines:
//! - `DriverError` - The (description, code, context) triple a driver returns
//!   with every failing call
//! - `ErrorKind` - The four-way classification reported to callers
//! - `MeterError` - The error type of every session operation
//! - `classify()` - Driver error → `MeterError` mapping

use crate::capability::CapabilityError;
use crate::consts::DEVICE_NOT_CONNECTED;
use std::fmt;
use thiserror::Error;

/// Error returned by an instrument driver call.
///
/// Carried by value with the failing call, so concurrent failures on
/// different meters never see each other's diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description} (error number {code}; context {context})")]
pub struct DriverError {
    /// Human-readable description from the driver.
    pub description: String,
    /// Driver numeric error code.
    pub code: i32,
    /// Driver-supplied context (function, subsystem).
    pub context: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(description: impl Into<String>, code: i32, context: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            code,
            context: context.into(),
        }
    }

    /// True if the code is the reserved "device not connected" code.
    pub fn is_not_connected(&self) -> bool {
        self.code == DEVICE_NOT_CONNECTED
    }
}

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or unknown argument, caught before any driver call.
    Invalid,
    /// Named session or physical instrument absent.
    NotFound,
    /// Transient instrument or I/O condition, expired calibration, busy driver.
    Unavailable,
    /// Capability table and driver disagree about an enumeration code.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Invalid => "invalid",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Error type for session and façade operations.
#[derive(Debug, Clone, Error)]
pub enum MeterError {
    /// Argument rejected before reaching the driver.
    #[error("Invalid argument: {message}")]
    Invalid {
        /// What was wrong.
        message: String,
    },

    /// Session or instrument not found.
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked for.
        message: String,
        /// Driver diagnostics, if a driver call reported the absence.
        #[source]
        driver: Option<DriverError>,
    },

    /// Instrument or transport unavailable.
    #[error("Unavailable: {message}")]
    Unavailable {
        /// Operation context.
        message: String,
        /// Driver diagnostics, if a driver call failed.
        #[source]
        driver: Option<DriverError>,
    },

    /// Capability table / driver skew.
    #[error("Internal consistency failure: {message}")]
    Internal {
        /// What disagreed.
        message: String,
    },
}

impl MeterError {
    /// Build an `Invalid` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Build a `NotFound` error with no driver diagnostics.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            driver: None,
        }
    }

    /// Build an `Unavailable` error with no driver diagnostics.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            driver: None,
        }
    }

    /// Build an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Driver diagnostics carried by this error, if any.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::NotFound { driver, .. } | Self::Unavailable { driver, .. } => driver.as_ref(),
            _ => None,
        }
    }
}

/// Classify a driver failure that happened while performing `operation`.
///
/// The reserved "device not connected" code maps to `NotFound`; every other
/// driver code is `Unavailable`. The driver triple is kept as the source.
pub fn classify(err: DriverError, operation: &str) -> MeterError {
    let message = format!("{err} ({operation})");
    if err.is_not_connected() {
        MeterError::NotFound {
            message,
            driver: Some(err),
        }
    } else {
        MeterError::Unavailable {
            message,
            driver: Some(err),
        }
    }
}

impl From<CapabilityError> for MeterError {
    /// A name lookup failure is caller input; a code lookup failure is skew.
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::NotFound { .. } => Self::invalid(err.to_string()),
            CapabilityError::Unrecognized { .. } => Self::internal(err.to_string()),
        }
    }
}
