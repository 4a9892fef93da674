//! Simulation driver configuration.
//!
//! Parsed from the `[driver_config.simulation]` table of `meter.toml`.
//! Every field has a default, so an empty table yields one emissive-capable
//! spectroradiometer named `i1pro-1`.

use meter_common::capability::{Capability, MeasurementMode};
use meter_common::consts::{
    DEFAULT_CALIBRATION_VALIDITY_SECS, DEFAULT_MIN_WAVELENGTH_NM, DEFAULT_SPECTRAL_SAMPLES,
    DEFAULT_WAVELENGTH_STEP_NM, INVALID_ARGUMENT, MAX_CALIBRATION_VALIDITY_SECS,
    MAX_SPECTRAL_SAMPLES,
};
use meter_common::driver::SpectralCapabilities;
use meter_common::error::DriverError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_validity_secs() -> u64 {
    DEFAULT_CALIBRATION_VALIDITY_SECS
}

fn default_sdk_version() -> String {
    format!("simulated-{}", env!("CARGO_PKG_VERSION"))
}

fn default_sample_count() -> usize {
    DEFAULT_SPECTRAL_SAMPLES
}

fn default_min_wavelength() -> u32 {
    DEFAULT_MIN_WAVELENGTH_NM
}

fn default_step() -> u32 {
    DEFAULT_WAVELENGTH_STEP_NM
}

fn default_make() -> String {
    "X-Rite".to_string()
}

fn default_model() -> String {
    "i1Pro 2".to_string()
}

fn default_firmware_version() -> String {
    "1.1.20".to_string()
}

fn default_modes() -> Vec<MeasurementMode> {
    vec![
        MeasurementMode::Emissive,
        MeasurementMode::Ambient,
        MeasurementMode::Reflective,
    ]
}

fn default_tristimulus() -> [f64; 3] {
    // D65 white, Y normalized to 100.
    [95.047, 100.0, 108.883]
}

fn default_meters() -> Vec<SimulatedMeterConfig> {
    vec![SimulatedMeterConfig::named("i1pro-1", "1000001")]
}

/// One simulated instrument on the bench.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatedMeterConfig {
    /// Name used to open the meter.
    pub name: String,

    /// Manufacturer reported by `identify`.
    #[serde(default = "default_make")]
    pub make: String,

    /// Model reported by `identify`.
    #[serde(default = "default_model")]
    pub model: String,

    /// Serial number reported by `identify`.
    #[serde(default)]
    pub serial_number: String,

    /// Firmware version reported by `identify`.
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,

    /// Measurement modes the meter supports.
    #[serde(default = "default_modes")]
    pub modes: Vec<MeasurementMode>,

    /// Tristimulus values returned by every measurement.
    #[serde(default = "default_tristimulus")]
    pub tristimulus: [f64; 3],

    /// Whether the meter starts plugged in.
    #[serde(default = "default_true")]
    pub connected: bool,
}

fn default_true() -> bool {
    true
}

impl SimulatedMeterConfig {
    /// A meter with default identity and capabilities.
    pub fn named(name: &str, serial_number: &str) -> Self {
        Self {
            name: name.to_string(),
            make: default_make(),
            model: default_model(),
            serial_number: serial_number.to_string(),
            firmware_version: default_firmware_version(),
            modes: default_modes(),
            tristimulus: default_tristimulus(),
            connected: true,
        }
    }
}

/// Configuration of the simulated instrument bench.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// How long a calibration stays valid, in seconds.
    #[serde(default = "default_validity_secs")]
    pub calibration_validity_secs: u64,

    /// Simulated wait for the calibration button press, in milliseconds.
    #[serde(default)]
    pub button_press_delay_ms: u64,

    /// Simulated duration of one measurement, in milliseconds.
    #[serde(default)]
    pub measurement_delay_ms: u64,

    /// SDK version string reported by the driver.
    #[serde(default = "default_sdk_version")]
    pub sdk_version: String,

    /// Number of spectral samples per measurement.
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,

    /// First sampled wavelength, nm.
    #[serde(default = "default_min_wavelength")]
    pub min_wavelength_nm: u32,

    /// Wavelength step, nm.
    #[serde(default = "default_step")]
    pub step_nm: u32,

    /// Meters on the bench.
    #[serde(default = "default_meters")]
    pub meters: Vec<SimulatedMeterConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            calibration_validity_secs: default_validity_secs(),
            button_press_delay_ms: 0,
            measurement_delay_ms: 0,
            sdk_version: default_sdk_version(),
            sample_count: default_sample_count(),
            min_wavelength_nm: default_min_wavelength(),
            step_nm: default_step(),
            meters: default_meters(),
        }
    }
}

impl SimulationConfig {
    /// Parse from a driver config table.
    pub fn from_value(value: &toml::Value) -> Result<Self, DriverError> {
        let config: Self = value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| config_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `sample_count` in 1..=`MAX_SPECTRAL_SAMPLES` and `step_nm` > 0
    /// 2. The last sampled wavelength fits in a `u32`
    /// 3. `calibration_validity_secs` <= `MAX_CALIBRATION_VALIDITY_SECS`
    /// 4. Meter names non-empty and unique
    /// 5. Every meter supports at least one mode, and never `undefined`
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.sample_count == 0 || self.sample_count > MAX_SPECTRAL_SAMPLES {
            return Err(config_error(format!(
                "sample_count must be between 1 and {MAX_SPECTRAL_SAMPLES}"
            )));
        }
        if self.step_nm == 0 {
            return Err(config_error("step_nm must be greater than 0"));
        }
        if !self.spectral_capabilities().is_representable() {
            return Err(config_error(format!(
                "{} samples from {} nm in {} nm steps exceed the wavelength range",
                self.sample_count, self.min_wavelength_nm, self.step_nm
            )));
        }
        if self.calibration_validity_secs > MAX_CALIBRATION_VALIDITY_SECS {
            return Err(config_error(format!(
                "calibration_validity_secs must not exceed {MAX_CALIBRATION_VALIDITY_SECS}"
            )));
        }

        let mut names = HashSet::new();
        for meter in &self.meters {
            if meter.name.trim().is_empty() {
                return Err(config_error("meter name cannot be empty"));
            }
            if !names.insert(meter.name.as_str()) {
                return Err(config_error(format!("Duplicate meter name: {}", meter.name)));
            }
            if meter.modes.is_empty() {
                return Err(config_error(format!(
                    "meter {} must support at least one measurement mode",
                    meter.name
                )));
            }
            if meter.modes.contains(&MeasurementMode::Undefined) {
                return Err(config_error(format!(
                    "meter {} lists the '{}' mode",
                    meter.name,
                    MeasurementMode::Undefined.name()
                )));
            }
        }
        Ok(())
    }

    /// Spectral sampling shared by every simulated meter.
    pub fn spectral_capabilities(&self) -> SpectralCapabilities {
        SpectralCapabilities {
            sample_count: self.sample_count,
            min_wavelength_nm: self.min_wavelength_nm,
            step_nm: self.step_nm,
        }
    }
}

fn config_error(description: impl Into<String>) -> DriverError {
    DriverError::new(description, INVALID_ARGUMENT, "simulation config")
}
