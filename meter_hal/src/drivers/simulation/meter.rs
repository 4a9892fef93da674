//! Simulated instrument.
//!
//! One `SimulatedMeter` per configured meter. It holds what a real device
//! keeps in firmware: connection state, the four setting codes, per-mode
//! calibration times and the last reading. Handles share it through a
//! mutex, so it outlives any single connection.

use super::config::{SimulatedMeterConfig, SimulationConfig};
use meter_common::capability::{
    Capability, ColorSpace, Illuminant, MeasurementMode, Observer,
};
use meter_common::consts::{
    CALIBRATION_EXPIRED, DEVICE_NOT_CALIBRATED, DEVICE_NOT_CONNECTED, DEVICE_NOT_OPEN,
    EXCEPTION, INVALID_ARGUMENT, NO_DATA_AVAILABLE, NO_MEASURE_MODE_SET,
};
use meter_common::driver::{CalibrationTimes, Tristimulus};
use meter_common::error::DriverError;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Last reading held by the device.
#[derive(Debug, Clone)]
pub(crate) struct Reading {
    pub tristimulus: Tristimulus,
    pub spectrum: Vec<f64>,
}

/// Device-side state of one simulated meter.
#[derive(Debug)]
pub(crate) struct SimulatedMeter {
    config: SimulatedMeterConfig,
    connected: bool,
    open: bool,
    mode: u32,
    observer: u32,
    color_space: u32,
    illuminant: u32,
    /// Mode code → calibration time.
    calibrations: HashMap<u32, Instant>,
    last: Option<Reading>,
    calls: u64,
}

impl SimulatedMeter {
    pub fn new(config: SimulatedMeterConfig) -> Self {
        let connected = config.connected;
        Self {
            config,
            connected,
            open: false,
            mode: MeasurementMode::Undefined.code(),
            observer: Observer::default().code(),
            color_space: ColorSpace::default().code(),
            illuminant: Illuminant::default().code(),
            calibrations: HashMap::new(),
            last: None,
            calls: 0,
        }
    }

    pub fn config(&self) -> &SimulatedMeterConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            self.open = false;
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Count a call and fail if the meter has been unplugged.
    pub fn enter(&mut self, context: &'static str) -> Result<(), DriverError> {
        self.calls += 1;
        if !self.connected {
            return Err(DriverError::new(
                format!("meter {} is not connected", self.config.name),
                DEVICE_NOT_CONNECTED,
                context,
            ));
        }
        Ok(())
    }

    /// `enter()` plus a check that a handle is open.
    pub fn enter_open(&mut self, context: &'static str) -> Result<(), DriverError> {
        self.enter(context)?;
        if !self.open {
            return Err(DriverError::new(
                format!("meter {} is not open", self.config.name),
                DEVICE_NOT_OPEN,
                context,
            ));
        }
        Ok(())
    }

    pub fn connect(&mut self) -> Result<(), DriverError> {
        self.enter("open")?;
        if self.open {
            return Err(DriverError::new(
                format!("meter {} is already open", self.config.name),
                EXCEPTION,
                "open",
            ));
        }
        self.open = true;
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), DriverError> {
        self.enter_open("close")?;
        self.open = false;
        Ok(())
    }

    // ─── Settings ───────────────────────────────────────────────────

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn set_mode(&mut self, code: u32) -> Result<(), DriverError> {
        let supported = MeasurementMode::from_code(code)
            .map(|mode| self.config.modes.contains(&mode))
            .unwrap_or(false);
        if !supported {
            return Err(invalid_code("measurement mode", code, "setMeasurementMode"));
        }
        if code != self.mode {
            self.last = None;
        }
        self.mode = code;
        Ok(())
    }

    pub fn observer(&self) -> u32 {
        self.observer
    }

    pub fn set_observer(&mut self, code: u32) -> Result<(), DriverError> {
        Observer::from_code(code).map_err(|_| invalid_code("observer", code, "setObserver"))?;
        self.observer = code;
        Ok(())
    }

    pub fn color_space(&self) -> u32 {
        self.color_space
    }

    pub fn set_color_space(&mut self, code: u32) -> Result<(), DriverError> {
        ColorSpace::from_code(code)
            .map_err(|_| invalid_code("color space", code, "setColorSpace"))?;
        self.color_space = code;
        Ok(())
    }

    pub fn illuminant(&self) -> u32 {
        self.illuminant
    }

    pub fn set_illuminant(&mut self, code: u32) -> Result<(), DriverError> {
        Illuminant::from_code(code)
            .map_err(|_| invalid_code("illuminant", code, "setIlluminant"))?;
        self.illuminant = code;
        Ok(())
    }

    // ─── Calibration and measurement ────────────────────────────────

    fn require_mode(&self, context: &'static str) -> Result<MeasurementMode, DriverError> {
        match MeasurementMode::from_code(self.mode) {
            Ok(MeasurementMode::Undefined) | Err(_) => Err(DriverError::new(
                "no measurement mode set",
                NO_MEASURE_MODE_SET,
                context,
            )),
            Ok(mode) => Ok(mode),
        }
    }

    pub fn calibrate(&mut self) -> Result<(), DriverError> {
        self.require_mode("calibrate")?;
        self.calibrations.insert(self.mode, Instant::now());
        Ok(())
    }

    pub fn calibration_times(&self, validity: Duration) -> Option<CalibrationTimes> {
        let at = self.calibrations.get(&self.mode)?;
        let since = at.elapsed();
        Some(CalibrationTimes {
            since,
            until: validity.saturating_sub(since),
        })
    }

    pub fn trigger(&mut self, settings: &SimulationConfig) -> Result<(), DriverError> {
        let mode = self.require_mode("triggerMeasurement")?;
        let validity = Duration::from_secs(settings.calibration_validity_secs);
        match self.calibration_times(validity) {
            None => {
                return Err(DriverError::new(
                    format!("{} mode is not calibrated", mode.name()),
                    DEVICE_NOT_CALIBRATED,
                    "triggerMeasurement",
                ));
            }
            Some(times) if times.until.is_zero() => {
                return Err(DriverError::new(
                    format!("{} calibration expired", mode.name()),
                    CALIBRATION_EXPIRED,
                    "triggerMeasurement",
                ));
            }
            Some(_) => {}
        }

        let [x, y, z] = self.config.tristimulus;
        let wavelengths = settings.spectral_capabilities();
        self.last = Some(Reading {
            tristimulus: Tristimulus::new(x, y, z),
            spectrum: wavelengths
                .wavelengths()
                .map(|nm| spectral_power(mode, f64::from(nm)))
                .collect(),
        });
        Ok(())
    }

    pub fn reading(&self, context: &'static str) -> Result<&Reading, DriverError> {
        self.last
            .as_ref()
            .ok_or_else(|| DriverError::new("no measurement available", NO_DATA_AVAILABLE, context))
    }
}

fn invalid_code(family: &str, code: u32, context: &'static str) -> DriverError {
    DriverError::new(
        format!("unsupported {family} code {code}"),
        INVALID_ARGUMENT,
        context,
    )
}

fn gaussian(nm: f64, center: f64, width: f64) -> f64 {
    let d = (nm - center) / width;
    (-0.5 * d * d).exp()
}

/// Relative spectral power at `nm` for a synthetic source of the given mode.
///
/// Emissive looks like an RGB display, ambient like a smooth daylight curve,
/// reflective like a warm-colored sample.
pub(crate) fn spectral_power(mode: MeasurementMode, nm: f64) -> f64 {
    match mode {
        MeasurementMode::Emissive => {
            0.8 * gaussian(nm, 450.0, 12.0)
                + 1.0 * gaussian(nm, 540.0, 20.0)
                + 0.9 * gaussian(nm, 610.0, 15.0)
        }
        MeasurementMode::Ambient => {
            let d = (nm - 560.0) / 200.0;
            (1.0 - 0.5 * d * d).max(0.0)
        }
        MeasurementMode::Reflective => 0.05 + 0.85 / (1.0 + (-(nm - 580.0) / 20.0).exp()),
        MeasurementMode::Undefined => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> SimulatedMeter {
        SimulatedMeter::new(SimulatedMeterConfig::named("m", "1"))
    }

    #[test]
    fn test_open_close() {
        let mut m = meter();
        m.connect().unwrap();
        assert_eq!(m.connect().unwrap_err().code, EXCEPTION);
        m.disconnect().unwrap();
        assert_eq!(m.disconnect().unwrap_err().code, DEVICE_NOT_OPEN);
    }

    #[test]
    fn test_unplugged_meter_reports_not_connected() {
        let mut m = meter();
        m.connect().unwrap();
        m.set_connected(false);
        let err = m.enter_open("trigger").unwrap_err();
        assert_eq!(err.code, DEVICE_NOT_CONNECTED);
        assert!(err.description.contains("not connected"));
    }

    #[test]
    fn test_unsupported_mode_rejected() {
        let mut config = SimulatedMeterConfig::named("m", "1");
        config.modes = vec![MeasurementMode::Emissive];
        let mut m = SimulatedMeter::new(config);
        assert_eq!(
            m.set_mode(MeasurementMode::Reflective.code()).unwrap_err().code,
            INVALID_ARGUMENT
        );
        assert_eq!(m.set_mode(0).unwrap_err().code, INVALID_ARGUMENT);
        m.set_mode(MeasurementMode::Emissive.code()).unwrap();
    }

    #[test]
    fn test_trigger_requires_calibration() {
        let settings = SimulationConfig::default();
        let mut m = meter();
        assert_eq!(m.trigger(&settings).unwrap_err().code, NO_MEASURE_MODE_SET);

        m.set_mode(MeasurementMode::Reflective.code()).unwrap();
        assert_eq!(m.trigger(&settings).unwrap_err().code, DEVICE_NOT_CALIBRATED);

        m.calibrate().unwrap();
        m.trigger(&settings).unwrap();
        let reading = m.reading("spectrum").unwrap();
        assert_eq!(reading.spectrum.len(), settings.sample_count);
        assert!(reading.spectrum.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_validity_expires_immediately() {
        let settings = SimulationConfig {
            calibration_validity_secs: 0,
            ..Default::default()
        };
        let mut m = meter();
        m.set_mode(MeasurementMode::Emissive.code()).unwrap();
        m.calibrate().unwrap();
        assert_eq!(m.trigger(&settings).unwrap_err().code, CALIBRATION_EXPIRED);
    }

    #[test]
    fn test_mode_change_drops_reading() {
        let settings = SimulationConfig::default();
        let mut m = meter();
        m.set_mode(MeasurementMode::Emissive.code()).unwrap();
        m.calibrate().unwrap();
        m.trigger(&settings).unwrap();
        m.set_mode(MeasurementMode::Ambient.code()).unwrap();
        assert_eq!(m.reading("colorimetry").unwrap_err().code, NO_DATA_AVAILABLE);
    }

    #[test]
    fn test_spectra_are_bounded() {
        for mode in [
            MeasurementMode::Emissive,
            MeasurementMode::Ambient,
            MeasurementMode::Reflective,
        ] {
            for nm in (380..=730).step_by(10) {
                let v = spectral_power(mode, f64::from(nm));
                assert!((0.0..=2.0).contains(&v), "{mode:?} at {nm} nm: {v}");
            }
        }
    }
}
