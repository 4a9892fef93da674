//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! for the meter service and its tools.
//!
//! # Usage
//!
//! ```rust,no_run
//! use meter_common::config::{ConfigLoader, ConfigError, MeterConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MeterConfig::load(Path::new("meter.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::capability::{ColorSpace, Illuminant, MeasurementMode, Observer};
use crate::consts::{DEFAULT_DRIVER, METER_SERVICE_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Represents the verbosity level of logging output.
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across meter applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "meter-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: METER_SERVICE_NAME.to_string(),
        }
    }
}

/// Settings applied to every session right after it is opened.
///
/// Names go through the capability tables, so an unknown name fails to
/// parse rather than reaching the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionDefaults {
    /// Measurement mode to select on open.
    #[serde(default)]
    pub measurement_mode: Option<MeasurementMode>,
    /// Observer to select on open.
    #[serde(default)]
    pub observer: Option<Observer>,
    /// Color space to select on open.
    #[serde(default)]
    pub color_space: Option<ColorSpace>,
    /// Illuminant to select on open.
    #[serde(default)]
    pub illuminant: Option<Illuminant>,
}

impl SessionDefaults {
    /// True if no default is set.
    pub fn is_empty(&self) -> bool {
        self.measurement_mode.is_none()
            && self.observer.is_none()
            && self.color_space.is_none()
            && self.illuminant.is_none()
    }
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

/// Main configuration loaded from `meter.toml`.
///
/// # TOML Example
///
/// ```toml
/// driver = "simulation"
///
/// [shared]
/// service_name = "meter-bench-01"
///
/// [defaults]
/// measurement_mode = "emissive"
/// color_space = "CIEXYZ"
///
/// [driver_config.simulation]
/// calibration_validity_secs = 10800
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Shared service settings.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Driver backend to load.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Settings applied to each session on open.
    #[serde(default)]
    pub defaults: SessionDefaults,

    /// Per-driver configuration sections.
    /// Key = driver name, Value = driver-specific TOML table.
    #[serde(default)]
    pub driver_config: HashMap<String, toml::Value>,
}

impl MeterConfig {
    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `shared` is valid
    /// 2. `driver` is not empty
    /// 3. `defaults.measurement_mode` is not `undefined`
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.driver.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "driver cannot be empty".to_string(),
            ));
        }

        if self.defaults.measurement_mode == Some(MeasurementMode::Undefined) {
            return Err(ConfigError::ValidationError(
                "defaults.measurement_mode cannot be 'undefined'".to_string(),
            ));
        }

        Ok(())
    }

    /// Config table for the named driver (empty table if absent).
    pub fn driver_settings(&self, driver: &str) -> toml::Value {
        self.driver_config
            .get(driver)
            .cloned()
            .unwrap_or_else(|| toml::Value::Table(toml::map::Map::new()))
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            driver: default_driver(),
            defaults: SessionDefaults::default(),
            driver_config: HashMap::new(),
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        for (text, level) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let parsed = toml::from_str::<TestWrapper>(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(parsed.level, level);
            assert_eq!(level.as_directive(), text);
        }
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = MeterConfig::load(Path::new("/nonexistent/path/meter.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = MeterConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_meter_config_defaults() {
        let config = MeterConfig::parse("").unwrap();
        assert_eq!(config.driver, "simulation");
        assert_eq!(config.shared.service_name, "meter");
        assert!(config.defaults.is_empty());
        assert!(config.validate().is_ok());
        assert!(config.driver_settings("simulation").as_table().unwrap().is_empty());
    }

    #[test]
    fn test_meter_config_full() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"driver = "simulation"

[shared]
log_level = "debug"
service_name = "bench"

[defaults]
measurement_mode = "reflective"
observer = "ten-degree-1964"
color_space = "CIELab"
illuminant = "D50"

[driver_config.simulation]
calibration_validity_secs = 60
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = MeterConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.defaults.measurement_mode, Some(MeasurementMode::Reflective));
        assert_eq!(config.defaults.observer, Some(Observer::TenDegree1964));
        assert_eq!(config.defaults.color_space, Some(ColorSpace::CieLab));
        assert_eq!(config.defaults.illuminant, Some(Illuminant::D50));
        let sim = config.driver_settings("simulation");
        assert_eq!(
            sim.get("calibration_validity_secs").and_then(|v| v.as_integer()),
            Some(60)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_default_name_rejected() {
        let result = MeterConfig::parse("[defaults]\ncolor_space = \"Bogus\"\n");
        match result {
            Err(ConfigError::ParseError(msg)) => assert!(msg.contains("Bogus")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_undefined_default_mode_rejected() {
        let config = MeterConfig::parse("[defaults]\nmeasurement_mode = \"undefined\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_empty_driver_rejected() {
        let config = MeterConfig::parse("driver = \"  \"\n").unwrap();
        assert!(config.validate().is_err());
    }
}
