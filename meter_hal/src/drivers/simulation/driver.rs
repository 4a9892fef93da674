//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements the `InstrumentDriver` trait to provide
//! a software instrument bench for development and testing without physical
//! spectroradiometers. Each configured meter is a [`SimulatedMeter`] shared
//! between the driver and the handle currently connected to it.

use super::config::SimulationConfig;
use super::meter::SimulatedMeter;
use meter_common::consts::DEVICE_NOT_CONNECTED;
use meter_common::driver::{
    CalibrationTimes, InstrumentDriver, MeterHandle, MeterIdentity, SpectralCapabilities,
    Tristimulus,
};
use meter_common::error::DriverError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type SharedMeter = Arc<Mutex<SimulatedMeter>>;

/// Simulation driver implementing the InstrumentDriver trait.
pub struct SimulationDriver {
    /// Driver name
    name: &'static str,
    /// Driver version
    version: &'static str,
    /// Bench settings shared with open handles
    config: Arc<SimulationConfig>,
    /// Meters in configuration order
    meters: Vec<(String, SharedMeter)>,
}

impl SimulationDriver {
    /// Create a simulation driver with the default bench (one meter, `i1pro-1`).
    pub fn new() -> Self {
        Self::with_config(SimulationConfig::default())
    }

    /// Create a simulation driver from an already parsed configuration.
    pub fn with_config(config: SimulationConfig) -> Self {
        let meters = build_meters(&config);
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            config: Arc::new(config),
            meters,
        }
    }

    /// Bench configuration in effect.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Plug or unplug a meter. Returns `false` if no such meter exists.
    ///
    /// Unplugging drops any open connection; every later call on its
    /// handle fails with the "device not connected" code.
    pub fn set_connected(&self, name: &str, connected: bool) -> bool {
        match self.meter(name) {
            Some(meter) => {
                info!("Simulated meter {} connected={}", name, connected);
                meter.lock().set_connected(connected);
                true
            }
            None => false,
        }
    }

    /// Number of driver calls the named meter has received.
    pub fn call_count(&self, name: &str) -> Option<u64> {
        self.meter(name).map(|meter| meter.lock().call_count())
    }

    fn meter(&self, name: &str) -> Option<&SharedMeter> {
        self.meters
            .iter()
            .find(|(meter_name, _)| meter_name == name)
            .map(|(_, meter)| meter)
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn build_meters(config: &SimulationConfig) -> Vec<(String, SharedMeter)> {
    config
        .meters
        .iter()
        .map(|meter| {
            (
                meter.name.clone(),
                Arc::new(Mutex::new(SimulatedMeter::new(meter.clone()))),
            )
        })
        .collect()
}

impl InstrumentDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn sdk_version(&self) -> String {
        self.config.sdk_version.clone()
    }

    fn init(&mut self, config: &toml::Value) -> Result<(), DriverError> {
        let config = SimulationConfig::from_value(config)?;
        info!(
            "Initializing simulation driver with {} meters, {} spectral samples, calibration valid {}s",
            config.meters.len(),
            config.sample_count,
            config.calibration_validity_secs
        );

        self.meters = build_meters(&config);
        self.config = Arc::new(config);

        info!("Simulation driver initialized");
        Ok(())
    }

    fn enumerate_meter_names(&self) -> Result<Vec<String>, DriverError> {
        let names: Vec<String> = self
            .meters
            .iter()
            .filter(|(_, meter)| meter.lock().is_connected())
            .map(|(name, _)| name.clone())
            .collect();
        debug!("Enumerated {} simulated meters", names.len());
        Ok(names)
    }

    fn open(&self, name: &str) -> Result<Box<dyn MeterHandle>, DriverError> {
        let meter = self.meter(name).ok_or_else(|| {
            DriverError::new(
                format!("no meter named {name} is attached"),
                DEVICE_NOT_CONNECTED,
                "open",
            )
        })?;
        meter.lock().connect()?;
        debug!("Opened simulated meter {}", name);
        Ok(Box::new(SimulatedHandle {
            meter: Arc::clone(meter),
            config: Arc::clone(&self.config),
        }))
    }

    fn shutdown(&self) -> Result<(), DriverError> {
        let open = self
            .meters
            .iter()
            .filter(|(_, meter)| meter.lock().is_open())
            .count();
        if open > 0 {
            warn!("Shutting down simulation driver with {} meters still open", open);
        } else {
            info!("Shutting down simulation driver");
        }
        Ok(())
    }
}

/// Connection to one simulated meter.
struct SimulatedHandle {
    meter: SharedMeter,
    config: Arc<SimulationConfig>,
}

impl SimulatedHandle {
    fn validity(&self) -> Duration {
        Duration::from_secs(self.config.calibration_validity_secs)
    }
}

impl MeterHandle for SimulatedHandle {
    fn identify(&mut self) -> Result<MeterIdentity, DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("getMeterInfo")?;
        let config = meter.config();
        Ok(MeterIdentity {
            make: config.make.clone(),
            model: config.model.clone(),
            serial_number: config.serial_number.clone(),
            firmware_version: config.firmware_version.clone(),
        })
    }

    fn spectral_capabilities(&mut self) -> Result<SpectralCapabilities, DriverError> {
        self.meter.lock().enter_open("getSpectralCapabilities")?;
        Ok(self.config.spectral_capabilities())
    }

    fn supported_measurement_modes(&mut self) -> Result<Vec<u32>, DriverError> {
        use meter_common::capability::Capability;

        let mut meter = self.meter.lock();
        meter.enter_open("getSupportedMeasurementModes")?;
        Ok(meter.config().modes.iter().map(|mode| mode.code()).collect())
    }

    fn measurement_mode(&mut self) -> Result<u32, DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("getMeasurementMode")?;
        Ok(meter.mode())
    }

    fn set_measurement_mode(&mut self, code: u32) -> Result<(), DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("setMeasurementMode")?;
        meter.set_mode(code)
    }

    fn observer(&mut self) -> Result<u32, DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("getObserver")?;
        Ok(meter.observer())
    }

    fn set_observer(&mut self, code: u32) -> Result<(), DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("setObserver")?;
        meter.set_observer(code)
    }

    fn color_space(&mut self) -> Result<u32, DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("getColorSpace")?;
        Ok(meter.color_space())
    }

    fn set_color_space(&mut self, code: u32) -> Result<(), DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("setColorSpace")?;
        meter.set_color_space(code)
    }

    fn illuminant(&mut self) -> Result<u32, DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("getIlluminant")?;
        Ok(meter.illuminant())
    }

    fn set_illuminant(&mut self, code: u32) -> Result<(), DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("setIlluminant")?;
        meter.set_illuminant(code)
    }

    fn calibrate(&mut self, wait_for_user: bool) -> Result<(), DriverError> {
        self.meter.lock().enter_open("calibrate")?;
        if wait_for_user && self.config.button_press_delay_ms > 0 {
            debug!(
                "Waiting {}ms for simulated button press",
                self.config.button_press_delay_ms
            );
            std::thread::sleep(Duration::from_millis(self.config.button_press_delay_ms));
        }
        let mut meter = self.meter.lock();
        meter.enter_open("calibrate")?;
        meter.calibrate()
    }

    fn calibration_times(&mut self) -> Result<Option<CalibrationTimes>, DriverError> {
        let validity = self.validity();
        let mut meter = self.meter.lock();
        meter.enter_open("getCalibrationTimes")?;
        Ok(meter.calibration_times(validity))
    }

    fn trigger(&mut self) -> Result<(), DriverError> {
        if self.config.measurement_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.measurement_delay_ms));
        }
        let mut meter = self.meter.lock();
        meter.enter_open("triggerMeasurement")?;
        meter.trigger(&self.config)
    }

    fn colorimetry(&mut self) -> Result<Tristimulus, DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("getTriStimulus")?;
        Ok(meter.reading("getTriStimulus")?.tristimulus)
    }

    fn spectrum(&mut self) -> Result<Vec<f64>, DriverError> {
        let mut meter = self.meter.lock();
        meter.enter_open("getSpectrum")?;
        Ok(meter.reading("getSpectrum")?.spectrum.clone())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.meter.lock().disconnect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::config::SimulatedMeterConfig;
    use meter_common::capability::{Capability, MeasurementMode};
    use meter_common::consts::{DEVICE_NOT_CALIBRATED, NO_DATA_AVAILABLE};

    fn two_meter_bench() -> SimulationDriver {
        let mut config = SimulationConfig::default();
        config.meters.push(SimulatedMeterConfig::named("i1pro-2", "1000002"));
        SimulationDriver::with_config(config)
    }

    #[test]
    fn test_default_bench() {
        let driver = SimulationDriver::new();
        assert_eq!(driver.name(), "simulation");
        assert!(driver.sdk_version().starts_with("simulated-"));
        assert_eq!(driver.enumerate_meter_names().unwrap(), vec!["i1pro-1"]);
    }

    #[test]
    fn test_init_from_toml() {
        let mut driver = SimulationDriver::new();
        let value: toml::Value = toml::from_str(
            r#"
sdk_version = "4.2.1"
[[meters]]
name = "left"
[[meters]]
name = "right"
connected = false
"#,
        )
        .unwrap();
        driver.init(&value).unwrap();
        assert_eq!(driver.sdk_version(), "4.2.1");
        assert_eq!(driver.enumerate_meter_names().unwrap(), vec!["left"]);
        assert_eq!(driver.open("right").err().unwrap().code, DEVICE_NOT_CONNECTED);
    }

    #[test]
    fn test_open_unknown_meter() {
        let driver = SimulationDriver::new();
        let err = driver.open("nope").err().unwrap();
        assert_eq!(err.code, DEVICE_NOT_CONNECTED);
    }

    #[test]
    fn test_measurement_flow() {
        let driver = SimulationDriver::new();
        let mut handle = driver.open("i1pro-1").unwrap();
        assert_eq!(handle.identify().unwrap().model, "i1Pro 2");
        assert_eq!(handle.measurement_mode().unwrap(), 0);

        handle
            .set_measurement_mode(MeasurementMode::Emissive.code())
            .unwrap();
        assert!(handle.calibration_times().unwrap().is_none());
        assert_eq!(handle.trigger().unwrap_err().code, DEVICE_NOT_CALIBRATED);
        assert_eq!(handle.colorimetry().unwrap_err().code, NO_DATA_AVAILABLE);

        handle.calibrate(true).unwrap();
        let times = handle.calibration_times().unwrap().unwrap();
        assert!(times.until > Duration::ZERO);

        handle.trigger().unwrap();
        assert!(handle.colorimetry().unwrap().is_finite());
        assert_eq!(handle.spectrum().unwrap().len(), 36);
        handle.close().unwrap();
    }

    #[test]
    fn test_meters_are_independent() {
        let driver = two_meter_bench();
        let mut a = driver.open("i1pro-1").unwrap();
        let mut b = driver.open("i1pro-2").unwrap();
        a.set_measurement_mode(MeasurementMode::Ambient.code()).unwrap();
        assert_eq!(b.measurement_mode().unwrap(), 0);
        assert!(driver.set_connected("i1pro-2", false));
        assert_eq!(b.identify().unwrap_err().code, DEVICE_NOT_CONNECTED);
        assert!(a.identify().is_ok());
    }

    #[test]
    fn test_call_count() {
        let driver = SimulationDriver::new();
        let mut handle = driver.open("i1pro-1").unwrap();
        let before = driver.call_count("i1pro-1").unwrap();
        handle.observer().unwrap();
        assert_eq!(driver.call_count("i1pro-1"), Some(before + 1));
        assert_eq!(driver.call_count("nope"), None);
    }

    #[test]
    fn test_calibration_survives_reconnect() {
        let driver = SimulationDriver::new();
        let mut handle = driver.open("i1pro-1").unwrap();
        handle
            .set_measurement_mode(MeasurementMode::Reflective.code())
            .unwrap();
        handle.calibrate(false).unwrap();
        handle.close().unwrap();

        // The device keeps its calibration; a new connection finds it.
        let mut handle = driver.open("i1pro-1").unwrap();
        assert_eq!(
            handle.measurement_mode().unwrap(),
            MeasurementMode::Reflective.code()
        );
        assert!(handle.calibration_times().unwrap().is_some());
        handle.trigger().unwrap();
        handle.close().unwrap();
        driver.shutdown().unwrap();
    }
}
