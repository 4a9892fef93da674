//! Instrument driver traits and boundary types.
//!
//! This module defines:
//! - `InstrumentDriver` trait - Backend that discovers and opens meters
//! - `MeterHandle` trait - One open connection to one physical meter
//! - `DriverFactory` type alias - Factory function type
//! - Boundary value types (`MeterIdentity`, `SpectralCapabilities`, ...)
//!
//! Capability settings cross this boundary as raw numeric codes, the way a
//! vendor SDK exposes them. Decoding them is the caller's job (see
//! [`crate::capability`]).

use crate::error::DriverError;
use serde::Serialize;
use std::time::Duration;

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn InstrumentDriver>;

/// Make, model, serial number and firmware reported by a meter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MeterIdentity {
    /// Manufacturer name.
    pub make: String,
    /// Model name.
    pub model: String,
    /// Serial number.
    pub serial_number: String,
    /// Firmware version running on the meter.
    pub firmware_version: String,
}

/// Spectral sampling reported by a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpectralCapabilities {
    /// Number of spectral samples per measurement.
    pub sample_count: usize,
    /// Wavelength of the first sample, nm.
    pub min_wavelength_nm: u32,
    /// Distance between adjacent samples, nm.
    pub step_nm: u32,
}

impl SpectralCapabilities {
    /// Wavelength of the last sample, nm.
    ///
    /// `None` if the range does not fit in a `u32`.
    pub fn max_wavelength_nm(&self) -> Option<u32> {
        let steps = u32::try_from(self.sample_count.saturating_sub(1)).ok()?;
        steps
            .checked_mul(self.step_nm)?
            .checked_add(self.min_wavelength_nm)
    }

    /// True if every sample wavelength is representable.
    pub fn is_representable(&self) -> bool {
        self.max_wavelength_nm().is_some()
    }

    /// Wavelength of every sample, nm.
    ///
    /// Saturates at `u32::MAX` for ranges that fail [`Self::is_representable`].
    pub fn wavelengths(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.sample_count).map(move |i| {
            let i = u32::try_from(i).unwrap_or(u32::MAX);
            i.saturating_mul(self.step_nm)
                .saturating_add(self.min_wavelength_nm)
        })
    }
}

/// Age and remaining validity of the current mode's calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTimes {
    /// Time since the calibration was performed.
    pub since: Duration,
    /// Time until the calibration expires (zero once expired).
    pub until: Duration,
}

/// Tristimulus triple in the configured color space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tristimulus {
    /// First component (X, L*, ...).
    pub x: f64,
    /// Second component.
    pub y: f64,
    /// Third component.
    pub z: f64,
}

impl Tristimulus {
    /// Create a new tristimulus triple.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True if all three components are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Components as a tuple.
    pub fn as_tuple(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }
}

/// Trait defining the interface for instrument driver backends.
///
/// The session registry manages meters through this trait, enabling
/// pluggable backends (simulation, vendor SDK bindings, ...).
///
/// # Lifecycle
///
/// 1. `init()` - Called once with the driver's config table
/// 2. `enumerate_meter_names()` / `open()` - Called any number of times,
///    possibly from several threads
/// 3. `shutdown()` - Called when the process is stopping
pub trait InstrumentDriver: Send + Sync {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Returns the version of the vendor SDK behind the driver.
    fn sdk_version(&self) -> String;

    /// Initialize the driver from its `[driver_config.<name>]` table.
    ///
    /// # Errors
    /// Return a `DriverError` if the table is malformed.
    fn init(&mut self, config: &toml::Value) -> Result<(), DriverError>;

    /// Names of the meters currently attached.
    fn enumerate_meter_names(&self) -> Result<Vec<String>, DriverError>;

    /// Open a connection to the named meter.
    ///
    /// May block while the transport is established.
    fn open(&self, name: &str) -> Result<Box<dyn MeterHandle>, DriverError>;

    /// Release driver-wide resources.
    fn shutdown(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// One open connection to a physical meter.
///
/// All methods block until the instrument answers. `calibrate()` with
/// `wait_for_user` set may block until a button on the device is pressed.
pub trait MeterHandle: Send {
    /// Make, model, serial number and firmware version.
    fn identify(&mut self) -> Result<MeterIdentity, DriverError>;

    /// Spectral sampling of this meter.
    fn spectral_capabilities(&mut self) -> Result<SpectralCapabilities, DriverError>;

    /// Codes of the measurement modes this meter supports.
    fn supported_measurement_modes(&mut self) -> Result<Vec<u32>, DriverError>;

    /// Current measurement mode code.
    fn measurement_mode(&mut self) -> Result<u32, DriverError>;

    /// Select a measurement mode.
    fn set_measurement_mode(&mut self, code: u32) -> Result<(), DriverError>;

    /// Current observer code.
    fn observer(&mut self) -> Result<u32, DriverError>;

    /// Select an observer.
    fn set_observer(&mut self, code: u32) -> Result<(), DriverError>;

    /// Current color space code.
    fn color_space(&mut self) -> Result<u32, DriverError>;

    /// Select a color space.
    fn set_color_space(&mut self, code: u32) -> Result<(), DriverError>;

    /// Current illuminant code.
    fn illuminant(&mut self) -> Result<u32, DriverError>;

    /// Select an illuminant.
    fn set_illuminant(&mut self, code: u32) -> Result<(), DriverError>;

    /// Calibrate the current measurement mode.
    fn calibrate(&mut self, wait_for_user: bool) -> Result<(), DriverError>;

    /// Calibration age and remaining validity for the current mode.
    ///
    /// `None` if the current mode has never been calibrated.
    fn calibration_times(&mut self) -> Result<Option<CalibrationTimes>, DriverError>;

    /// Take a measurement in the current mode.
    fn trigger(&mut self) -> Result<(), DriverError>;

    /// Colorimetry of the last measurement.
    fn colorimetry(&mut self) -> Result<Tristimulus, DriverError>;

    /// Spectral samples of the last measurement.
    fn spectrum(&mut self) -> Result<Vec<f64>, DriverError>;

    /// Release the connection. Called at most once per handle.
    fn close(&mut self) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectral_capabilities_range() {
        let caps = SpectralCapabilities {
            sample_count: 36,
            min_wavelength_nm: 380,
            step_nm: 10,
        };
        assert_eq!(caps.max_wavelength_nm(), Some(730));
        let wl: Vec<u32> = caps.wavelengths().collect();
        assert_eq!(wl.len(), 36);
        assert_eq!(wl[1], 390);
    }

    #[test]
    fn test_spectral_capabilities_empty() {
        let caps = SpectralCapabilities {
            sample_count: 0,
            min_wavelength_nm: 380,
            step_nm: 10,
        };
        assert_eq!(caps.max_wavelength_nm(), Some(380));
        assert_eq!(caps.wavelengths().count(), 0);
    }

    #[test]
    fn test_spectral_capabilities_overflow() {
        let caps = SpectralCapabilities {
            sample_count: 36,
            min_wavelength_nm: 380,
            step_nm: 200_000_000,
        };
        assert_eq!(caps.max_wavelength_nm(), None);
        assert!(!caps.is_representable());
        let wl: Vec<u32> = caps.wavelengths().collect();
        assert_eq!(wl.len(), 36);
        assert_eq!(*wl.last().unwrap(), u32::MAX);

        let huge = SpectralCapabilities {
            sample_count: usize::MAX,
            min_wavelength_nm: 0,
            step_nm: 2,
        };
        assert!(!huge.is_representable());
    }

    #[test]
    fn test_tristimulus_finite() {
        assert!(Tristimulus::new(95.0, 100.0, 108.9).is_finite());
        assert!(!Tristimulus::new(f64::NAN, 1.0, 1.0).is_finite());
        assert_eq!(Tristimulus::new(1.0, 2.0, 3.0).as_tuple(), (1.0, 2.0, 3.0));
    }
}
