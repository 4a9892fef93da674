//! Session façade.
//!
//! `MeterService` is the operation set callers use. Every operation takes a
//! session name and validates its arguments in a fixed order before any
//! driver call:
//!
//! 1. session name (empty or containing control characters → `Invalid`)
//! 2. config field and symbolic value (unknown → `Invalid`)
//! 3. session lookup (unknown or never opened → `NotFound`)
//!
//! Driver failures come back classified (see [`meter_common::error::classify`]).

use crate::driver_registry::DriverRegistry;
use crate::registry::SessionRegistry;
use crate::session::{CalibrationAge, Measurement, SessionInfo, SessionState};
use meter_common::capability::{
    Capability, CapabilityNames, ColorSpace, Illuminant, MeasurementMode, Observer,
};
use meter_common::config::{MeterConfig, SessionDefaults};
use meter_common::driver::{InstrumentDriver, Tristimulus};
use meter_common::error::{MeterError, classify};
use meter_common::prelude::MeterResult;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Addressable configuration field of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    /// `measurement_mode` (alias `mode`).
    MeasurementMode,
    /// `observer`.
    Observer,
    /// `color_space` (alias `colorspace`).
    ColorSpace,
    /// `illuminant`.
    Illuminant,
}

impl ConfigField {
    /// Every field, in canonical order.
    pub const ALL: [ConfigField; 4] = [
        Self::MeasurementMode,
        Self::Observer,
        Self::ColorSpace,
        Self::Illuminant,
    ];

    /// Canonical field name.
    pub fn name(self) -> &'static str {
        match self {
            Self::MeasurementMode => "measurement_mode",
            Self::Observer => "observer",
            Self::ColorSpace => "color_space",
            Self::Illuminant => "illuminant",
        }
    }

    /// Symbolic names the field accepts.
    pub fn accepted_values(self) -> Vec<&'static str> {
        match self {
            Self::MeasurementMode => MeasurementMode::table().names().collect(),
            Self::Observer => Observer::table().names().collect(),
            Self::ColorSpace => ColorSpace::table().names().collect(),
            Self::Illuminant => Illuminant::table().names().collect(),
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigField {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "measurement_mode" | "mode" => Ok(Self::MeasurementMode),
            "observer" => Ok(Self::Observer),
            "color_space" | "colorspace" => Ok(Self::ColorSpace),
            "illuminant" => Ok(Self::Illuminant),
            other => Err(MeterError::invalid(format!(
                "unknown config field '{other}'; known fields are: {}",
                Self::ALL.map(ConfigField::name).join(", ")
            ))),
        }
    }
}

/// A parsed config value, ready to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Setting {
    MeasurementMode(MeasurementMode),
    Observer(Observer),
    ColorSpace(ColorSpace),
    Illuminant(Illuminant),
}

impl Setting {
    fn parse(field: ConfigField, value: &str) -> MeterResult<Self> {
        Ok(match field {
            ConfigField::MeasurementMode => Self::MeasurementMode(MeasurementMode::from_name(value)?),
            ConfigField::Observer => Self::Observer(Observer::from_name(value)?),
            ConfigField::ColorSpace => Self::ColorSpace(ColorSpace::from_name(value)?),
            ConfigField::Illuminant => Self::Illuminant(Illuminant::from_name(value)?),
        })
    }
}

/// Check a session name before it reaches the registry.
pub fn validate_name(name: &str) -> MeterResult<()> {
    if name.trim().is_empty() {
        return Err(MeterError::invalid("session name cannot be empty"));
    }
    if name.chars().any(char::is_control) {
        return Err(MeterError::invalid(format!(
            "session name {name:?} contains control characters"
        )));
    }
    Ok(())
}

/// The public operation set over a session registry.
///
/// `Send + Sync`; share it behind an `Arc` to use it from several threads.
pub struct MeterService {
    registry: SessionRegistry,
    defaults: SessionDefaults,
}

impl MeterService {
    /// Create a service over an initialized driver.
    pub fn new(driver: Arc<dyn InstrumentDriver>) -> Self {
        Self {
            registry: SessionRegistry::new(driver),
            defaults: SessionDefaults::default(),
        }
    }

    /// Settings applied to every newly opened session.
    pub fn with_defaults(mut self, defaults: SessionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Create the configured driver, initialize it and wrap it in a service.
    pub fn from_config(config: &MeterConfig, drivers: &DriverRegistry) -> MeterResult<Self> {
        let mut driver = drivers.create_driver(&config.driver)?;
        info!(
            "Initializing driver {} v{} (SDK {})",
            driver.name(),
            driver.version(),
            driver.sdk_version()
        );
        driver
            .init(&config.driver_settings(&config.driver))
            .map_err(|e| classify(e, "initializing driver"))?;
        Ok(Self::new(Arc::from(driver)).with_defaults(config.defaults))
    }

    /// Driver behind the service.
    pub fn driver(&self) -> &Arc<dyn InstrumentDriver> {
        self.registry.driver()
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Names of the attached meters. Each becomes an `Unopened` session.
    pub fn enumerate(&self) -> MeterResult<Vec<String>> {
        self.registry.enumerate()
    }

    /// Open the named meter.
    ///
    /// Configured defaults are applied to a newly opened session; if that
    /// fails the session is closed again and the error returned.
    pub fn open(&self, name: &str) -> MeterResult<SessionInfo> {
        validate_name(name)?;
        let opened = self.registry.open(name)?;
        if !opened.newly_opened || self.defaults.is_empty() {
            return Ok(opened.info);
        }

        match self.apply_defaults(name) {
            Ok(info) => Ok(info),
            Err(e) => {
                warn!("Failed to apply defaults to {}: {}", name, e);
                if let Err(close_err) = self.registry.close(name) {
                    warn!("Failed to close {}: {}", name, close_err);
                }
                Err(e)
            }
        }
    }

    fn apply_defaults(&self, name: &str) -> MeterResult<SessionInfo> {
        let defaults = self.defaults;
        self.registry.with_session(name, |session| {
            if let Some(mode) = defaults.measurement_mode {
                session.set_measurement_mode(mode)?;
            }
            if let Some(observer) = defaults.observer {
                session.set_observer(observer)?;
            }
            if let Some(color_space) = defaults.color_space {
                session.set_color_space(color_space)?;
            }
            if let Some(illuminant) = defaults.illuminant {
                session.set_illuminant(illuminant)?;
            }
            Ok(session.info())
        })
    }

    /// Close the named session. Closing an unknown or closed session is a no-op.
    pub fn close(&self, name: &str) -> MeterResult<()> {
        validate_name(name)?;
        self.registry.close(name)
    }

    /// Close every session.
    pub fn close_all(&self) {
        self.registry.close_all();
    }

    /// Close every session and shut the driver down.
    pub fn shutdown(&self) -> MeterResult<()> {
        self.registry.close_all();
        self.driver()
            .shutdown()
            .map_err(|e| classify(e, "shutting down driver"))
    }

    // ─── Introspection ──────────────────────────────────────────────

    /// Summary of the named session.
    pub fn session_info(&self, name: &str) -> MeterResult<SessionInfo> {
        validate_name(name)?;
        self.registry.info(name)
    }

    /// Name and state of every session, sorted by name.
    pub fn sessions(&self) -> Vec<(String, SessionState)> {
        self.registry.sessions()
    }

    /// Measurement modes the named meter supports.
    pub fn supported_modes(&self, name: &str) -> MeterResult<Vec<MeasurementMode>> {
        validate_name(name)?;
        self.registry.with_session(name, |s| s.supported_modes())
    }

    /// Symbolic names of every capability family.
    pub fn capabilities(&self) -> CapabilityNames {
        CapabilityNames::all()
    }

    // ─── Configuration ──────────────────────────────────────────────

    /// Current value of a config field, as its symbolic name.
    pub fn get_config(&self, name: &str, field: &str) -> MeterResult<&'static str> {
        validate_name(name)?;
        let field: ConfigField = field.parse()?;
        self.registry.with_session(name, |session| {
            Ok(match field {
                ConfigField::MeasurementMode => session.measurement_mode()?.name(),
                ConfigField::Observer => session.observer()?.name(),
                ConfigField::ColorSpace => session.color_space()?.name(),
                ConfigField::Illuminant => session.illuminant()?.name(),
            })
        })
    }

    /// Set a config field from its symbolic value.
    pub fn set_config(&self, name: &str, field: &str, value: &str) -> MeterResult<()> {
        validate_name(name)?;
        let field: ConfigField = field.parse()?;
        self.apply(name, Setting::parse(field, value)?)
    }

    /// Select a measurement mode by name.
    pub fn set_measurement_mode(&self, name: &str, mode: &str) -> MeterResult<()> {
        self.set_config(name, "measurement_mode", mode)
    }

    /// Select an observer by name.
    pub fn set_observer(&self, name: &str, observer: &str) -> MeterResult<()> {
        self.set_config(name, "observer", observer)
    }

    /// Select a color space by name.
    pub fn set_color_space(&self, name: &str, color_space: &str) -> MeterResult<()> {
        self.set_config(name, "color_space", color_space)
    }

    /// Select an illuminant by name.
    pub fn set_illuminant(&self, name: &str, illuminant: &str) -> MeterResult<()> {
        self.set_config(name, "illuminant", illuminant)
    }

    fn apply(&self, name: &str, setting: Setting) -> MeterResult<()> {
        self.registry.with_session(name, |session| match setting {
            Setting::MeasurementMode(mode) => session.set_measurement_mode(mode),
            Setting::Observer(observer) => session.set_observer(observer),
            Setting::ColorSpace(color_space) => session.set_color_space(color_space),
            Setting::Illuminant(illuminant) => session.set_illuminant(illuminant),
        })
    }

    // ─── Calibration and measurement ────────────────────────────────

    /// Calibrate the current mode of the named meter.
    pub fn calibrate(&self, name: &str, wait_for_user: bool) -> MeterResult<()> {
        validate_name(name)?;
        self.registry
            .with_session(name, |s| s.calibrate(wait_for_user))
    }

    /// Seconds since calibration and until expiry of the current mode.
    pub fn get_calibration_times(&self, name: &str) -> MeterResult<Option<CalibrationAge>> {
        validate_name(name)?;
        self.registry.with_session(name, |s| s.calibration_times())
    }

    /// Seconds since calibration and until expiry of `mode`, which need not
    /// be the current mode. `None` if that mode was never calibrated.
    pub fn get_calibration_times_for(
        &self,
        name: &str,
        mode: &str,
    ) -> MeterResult<Option<CalibrationAge>> {
        validate_name(name)?;
        let mode = MeasurementMode::from_name(mode)?;
        self.registry
            .with_session(name, |s| s.calibration_times_for(mode))
    }

    /// Take a measurement.
    pub fn trigger(&self, name: &str) -> MeterResult<()> {
        validate_name(name)?;
        self.registry.with_session(name, |s| s.trigger().map(|_| ()))
    }

    /// Colorimetry of the last measurement.
    pub fn read_colorimetry(&self, name: &str) -> MeterResult<Tristimulus> {
        validate_name(name)?;
        self.registry.with_session(name, |s| s.read_colorimetry())
    }

    /// Spectrum of the last measurement, one sample per reported wavelength.
    pub fn read_spectrum(&self, name: &str) -> MeterResult<Vec<f64>> {
        validate_name(name)?;
        self.registry.with_session(name, |s| s.read_spectrum())
    }

    /// Full snapshot of the last measurement.
    pub fn last_measurement(&self, name: &str) -> MeterResult<Measurement> {
        validate_name(name)?;
        self.registry
            .with_session(name, |s| s.last_measurement().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_common::error::ErrorKind;

    #[test]
    fn test_config_field_aliases() {
        assert_eq!("mode".parse::<ConfigField>().unwrap(), ConfigField::MeasurementMode);
        assert_eq!(
            "measurement_mode".parse::<ConfigField>().unwrap(),
            ConfigField::MeasurementMode
        );
        assert_eq!("colorspace".parse::<ConfigField>().unwrap(), ConfigField::ColorSpace);
        assert_eq!("color_space".parse::<ConfigField>().unwrap(), ConfigField::ColorSpace);
        assert_eq!(ConfigField::Illuminant.to_string(), "illuminant");
    }

    #[test]
    fn test_unknown_config_field() {
        let err = "brightness".parse::<ConfigField>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("color_space"));
    }

    #[test]
    fn test_setting_parse() {
        assert_eq!(
            Setting::parse(ConfigField::Illuminant, "D50").unwrap(),
            Setting::Illuminant(Illuminant::D50)
        );
        let err = Setting::parse(ConfigField::ColorSpace, "Bogus").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("CIEXYZ"));
    }

    #[test]
    fn test_accepted_values() {
        assert_eq!(ConfigField::Observer.accepted_values().len(), 2);
        assert_eq!(ConfigField::Illuminant.accepted_values().len(), 11);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("i1pro-1").is_ok());
        assert_eq!(validate_name("").unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(validate_name("   ").unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(validate_name("a\nb").unwrap_err().kind(), ErrorKind::Invalid);
    }
}
