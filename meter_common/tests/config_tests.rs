//! Config loading tests.
//!
//! Tests for `MeterConfig`: file discovery, defaults, `[defaults]` name
//! resolution through the capability tables, unknown field rejection and
//! per-driver tables.

use meter_common::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write `meter.toml` into `dir` and return its path.
fn write_meter_toml(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("meter.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn minimal_file_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = write_meter_toml(tmp.path(), "");

    let config = MeterConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.driver, "simulation");
    assert_eq!(config.shared.log_level, LogLevel::Info);
    assert!(config.defaults.is_empty());
}

#[test]
fn missing_file_is_reported() {
    let tmp = TempDir::new().unwrap();
    let result = MeterConfig::load(&tmp.path().join("meter.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn defaults_resolve_every_family() {
    let tmp = TempDir::new().unwrap();
    let path = write_meter_toml(
        tmp.path(),
        r#"
[defaults]
measurement_mode = "ambient"
observer = "two-degree-1931"
color_space = "CIE-u'v'-Y1976"
illuminant = "Emission"
"#,
    );

    let config = MeterConfig::load(&path).unwrap();
    assert_eq!(
        config.defaults,
        SessionDefaults {
            measurement_mode: Some(MeasurementMode::Ambient),
            observer: Some(Observer::TwoDegree1931),
            color_space: Some(ColorSpace::CieUPrimeVPrimeY1976),
            illuminant: Some(Illuminant::Emission),
        }
    );
}

#[test]
fn defaults_are_case_sensitive() {
    let result = MeterConfig::parse("[defaults]\nilluminant = \"d65\"\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn unknown_defaults_field_rejected() {
    let result = MeterConfig::parse("[defaults]\nbrightness = \"high\"\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn driver_tables_are_kept_opaque() {
    let config = MeterConfig::parse(
        r#"
driver = "simulation"

[driver_config.simulation]
sample_count = 41

[[driver_config.simulation.meters]]
name = "bench-left"

[driver_config.vendor]
library = "/opt/vendor/lib.so"
"#,
    )
    .unwrap();

    let sim = config.driver_settings("simulation");
    let meters = sim.get("meters").and_then(|m| m.as_array()).unwrap();
    assert_eq!(meters.len(), 1);
    assert_eq!(
        config
            .driver_settings("vendor")
            .get("library")
            .and_then(|v| v.as_str()),
        Some("/opt/vendor/lib.so")
    );
    assert!(
        config
            .driver_settings("absent")
            .as_table()
            .is_some_and(|t| t.is_empty())
    );
}

#[test]
fn empty_service_name_fails_validation() {
    let config = MeterConfig::parse("[shared]\nservice_name = \"\"\n").unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}
