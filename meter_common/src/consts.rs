//! System-wide constants for the meter workspace.
//!
//! Single source of truth for driver error codes, spectral defaults and
//! default paths. Imported by all crates.

/// Canonical service name (used for logging and the default config).
pub const METER_SERVICE_NAME: &str = "meter";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/meter/meter.toml";

/// Default driver backend.
pub const DEFAULT_DRIVER: &str = "simulation";

// ─── Driver error codes ─────────────────────────────────────────────
//
// Numeric codes carried in `DriverError::code`. Only
// `DEVICE_NOT_CONNECTED` has classification meaning; the rest exist so the
// simulation driver reports failures the way a vendor SDK does.

/// No error.
pub const NO_ERROR: i32 = 0;
/// Generic driver exception.
pub const EXCEPTION: i32 = 1;
/// Argument rejected by the driver.
pub const INVALID_ARGUMENT: i32 = 10;
/// Handle no longer open.
pub const DEVICE_NOT_OPEN: i32 = 11;
/// Reserved code: the instrument is not connected.
pub const DEVICE_NOT_CONNECTED: i32 = 12;
/// Current mode has no valid calibration on the device.
pub const DEVICE_NOT_CALIBRATED: i32 = 13;
/// No measurement results are available.
pub const NO_DATA_AVAILABLE: i32 = 14;
/// Measurement mode unset or unsupported.
pub const NO_MEASURE_MODE_SET: i32 = 15;
/// Calibration expired on the device.
pub const CALIBRATION_EXPIRED: i32 = 16;

// ─── Spectral defaults ──────────────────────────────────────────────

/// Default number of spectral samples (380–730 nm in 10 nm steps).
pub const DEFAULT_SPECTRAL_SAMPLES: usize = 36;

/// Default shortest sampled wavelength, nm.
pub const DEFAULT_MIN_WAVELENGTH_NM: u32 = 380;

/// Default wavelength step between samples, nm.
pub const DEFAULT_WAVELENGTH_STEP_NM: u32 = 10;

/// Upper bound on the number of spectral samples a meter may report.
pub const MAX_SPECTRAL_SAMPLES: usize = 4096;

// ─── Calibration ────────────────────────────────────────────────────

/// Default calibration validity window in seconds (3 hours).
pub const DEFAULT_CALIBRATION_VALIDITY_SECS: u64 = 3 * 60 * 60;

/// Longest calibration validity honored, in seconds (one year).
///
/// Longer windows reported by a driver are clamped to this.
pub const MAX_CALIBRATION_VALIDITY_SECS: u64 = 365 * 24 * 60 * 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_distinct() {
        let codes = [
            NO_ERROR,
            EXCEPTION,
            INVALID_ARGUMENT,
            DEVICE_NOT_OPEN,
            DEVICE_NOT_CONNECTED,
            DEVICE_NOT_CALIBRATED,
            NO_DATA_AVAILABLE,
            NO_MEASURE_MODE_SET,
            CALIBRATION_EXPIRED,
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn default_spectral_range_spans_visible() {
        let max = DEFAULT_MIN_WAVELENGTH_NM
            + DEFAULT_WAVELENGTH_STEP_NM * (DEFAULT_SPECTRAL_SAMPLES as u32 - 1);
        assert_eq!(max, 730);
    }
}
