//! Instrument session.
//!
//! An `InstrumentSession` is the host-side view of one named meter: its
//! driver handle, identity, current settings, per-mode calibration windows
//! and the last measurement. Past `Open`, the lifecycle state is derived
//! from that data.
//!
//! # State machine
//!
//! ```text
//! Unopened ──open──► Open ──set*──► Configured ──calibrate──► Calibrated ──trigger──► Triggered
//!                                                                                         │
//!    any state ──close──► Closed                                       trigger / read ◄──┘
//! ```
//!
//! Calibration is scoped to the measurement mode. Switching to a mode that
//! still holds an unexpired calibration lands in `Calibrated`; otherwise the
//! session drops back to `Configured`.

use meter_common::capability::{Capability, ColorSpace, Illuminant, MeasurementMode, Observer};
use meter_common::driver::{
    CalibrationTimes, InstrumentDriver, MeterHandle, MeterIdentity, SpectralCapabilities,
    Tristimulus,
};
use meter_common::consts::{MAX_CALIBRATION_VALIDITY_SECS, MAX_SPECTRAL_SAMPLES};
use meter_common::error::{MeterError, classify};
use meter_common::prelude::MeterResult;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Known by name (discovered or being opened) but not connected.
    Unopened,
    /// Connected, nothing configured yet.
    Open,
    /// At least one setting applied.
    Configured,
    /// Current mode holds an unexpired calibration.
    Calibrated,
    /// A measurement is available.
    Triggered,
    /// Handle released. Terminal.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unopened => "unopened",
            Self::Open => "open",
            Self::Configured => "configured",
            Self::Calibrated => "calibrated",
            Self::Triggered => "triggered",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Calibration of one measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationWindow {
    /// When the calibration was performed.
    pub calibrated_at: Instant,
    /// When it stops being valid.
    pub expires_at: Instant,
}

impl CalibrationWindow {
    /// Build a window from driver-reported times, anchored at `now`.
    ///
    /// Validity is clamped to `MAX_CALIBRATION_VALIDITY_SECS`.
    pub fn from_times(times: CalibrationTimes, now: Instant) -> Self {
        let until = times
            .until
            .min(Duration::from_secs(MAX_CALIBRATION_VALIDITY_SECS));
        Self {
            calibrated_at: now.checked_sub(times.since).unwrap_or(now),
            expires_at: now.checked_add(until).unwrap_or(now),
        }
    }

    /// True while the calibration is still valid.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Whole seconds since calibration and until expiry.
    pub fn age_at(&self, now: Instant) -> CalibrationAge {
        CalibrationAge {
            seconds_since_calibration: now.saturating_duration_since(self.calibrated_at).as_secs(),
            seconds_until_expiry: self.expires_at.saturating_duration_since(now).as_secs(),
        }
    }
}

/// Calibration age of the current mode as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalibrationAge {
    /// Seconds elapsed since the calibration.
    pub seconds_since_calibration: u64,
    /// Seconds left before recalibration is required (zero once expired).
    pub seconds_until_expiry: u64,
}

/// Snapshot of one measurement and the settings it was taken with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Meter the measurement came from.
    pub meter: String,
    /// Sequence number within the session, starting at 1.
    pub sequence: u64,
    /// Measurement mode in force.
    pub measurement_mode: MeasurementMode,
    /// Observer in force.
    pub observer: Observer,
    /// Color space of `tristimulus`.
    pub color_space: ColorSpace,
    /// Illuminant in force.
    pub illuminant: Illuminant,
    /// Colorimetric triple.
    pub tristimulus: Tristimulus,
    /// Spectral samples, one per `wavelengths` entry.
    pub spectrum: Vec<f64>,
    /// Wavelength of each spectral sample, nm.
    pub wavelengths: Vec<u32>,
}

/// Serializable summary of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    /// Session name.
    pub name: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// Make, model and serial number.
    pub identity: MeterIdentity,
    /// Spectral sampling, once opened.
    pub spectral: Option<SpectralCapabilities>,
    /// Modes the meter supports.
    pub supported_modes: Vec<MeasurementMode>,
    /// Current measurement mode.
    pub measurement_mode: MeasurementMode,
    /// Current observer.
    pub observer: Observer,
    /// Current color space.
    pub color_space: ColorSpace,
    /// Current illuminant.
    pub illuminant: Illuminant,
    /// Calibration of the current mode, if any.
    pub calibration: Option<CalibrationAge>,
    /// Measurements taken in this session.
    pub measurement_count: u64,
    /// Driver version.
    pub driver_version: String,
    /// Vendor SDK version.
    pub sdk_version: String,
}

/// One named instrument and everything the host knows about it.
pub struct InstrumentSession {
    name: String,
    /// Only `Unopened`, `Open` or `Closed`; finer states are derived.
    lifecycle: SessionState,
    handle: Option<Box<dyn MeterHandle>>,
    discovered: bool,
    identity: MeterIdentity,
    spectral: Option<SpectralCapabilities>,
    supported_modes: Vec<MeasurementMode>,
    measurement_mode: MeasurementMode,
    observer: Observer,
    color_space: ColorSpace,
    illuminant: Illuminant,
    configured: bool,
    calibrations: HashMap<MeasurementMode, CalibrationWindow>,
    last_measurement: Option<Measurement>,
    measurement_count: u64,
    driver_version: String,
    sdk_version: String,
}

impl InstrumentSession {
    /// A session that has a name but no connection.
    ///
    /// `discovered` marks sessions created by enumeration; those stay in the
    /// registry when an open attempt fails.
    pub fn unopened(name: impl Into<String>, discovered: bool) -> Self {
        Self {
            name: name.into(),
            lifecycle: SessionState::Unopened,
            handle: None,
            discovered,
            identity: MeterIdentity::default(),
            spectral: None,
            supported_modes: Vec::new(),
            measurement_mode: MeasurementMode::default(),
            observer: Observer::default(),
            color_space: ColorSpace::default(),
            illuminant: Illuminant::default(),
            configured: false,
            calibrations: HashMap::new(),
            last_measurement: None,
            measurement_count: 0,
            driver_version: String::new(),
            sdk_version: String::new(),
        }
    }

    /// Session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if the session was created by enumeration.
    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    /// True if a driver handle is held.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.lifecycle != SessionState::Open {
            return self.lifecycle;
        }
        if self.last_measurement.is_some() {
            SessionState::Triggered
        } else if self.current_window().is_some_and(|w| w.is_valid_at(Instant::now())) {
            SessionState::Calibrated
        } else if self.configured {
            SessionState::Configured
        } else {
            SessionState::Open
        }
    }

    /// Mark a never-opened session as dead so concurrent waiters retry.
    pub(crate) fn abandon(&mut self) {
        if self.handle.is_none() {
            self.lifecycle = SessionState::Closed;
        }
    }

    fn current_window(&self) -> Option<&CalibrationWindow> {
        self.calibrations.get(&self.measurement_mode)
    }

    /// Driver handle of an open session.
    ///
    /// `NotFound` if the session was never opened, `Invalid` if it has been
    /// closed.
    fn handle(&mut self) -> MeterResult<&mut Box<dyn MeterHandle>> {
        match self.lifecycle {
            SessionState::Closed => {
                return Err(MeterError::invalid(format!("session {} closed", self.name)));
            }
            SessionState::Unopened => {
                return Err(MeterError::not_found(format!(
                    "session {} has not been opened",
                    self.name
                )));
            }
            _ => {}
        }
        let name = &self.name;
        self.handle
            .as_mut()
            .ok_or_else(|| MeterError::not_found(format!("session {name} has no connection")))
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Connect to the meter and read its identity, capabilities and settings.
    ///
    /// Opening an already open session is a no-op.
    pub fn open(&mut self, driver: &dyn InstrumentDriver) -> MeterResult<()> {
        match self.lifecycle {
            SessionState::Closed => {
                return Err(MeterError::invalid(format!("session {} closed", self.name)));
            }
            SessionState::Unopened => {}
            _ => return Ok(()),
        }

        let mut handle = driver
            .open(&self.name)
            .map_err(|e| classify(e, "opening meter"))?;

        match self.probe(handle.as_mut()) {
            Ok(()) => {
                self.handle = Some(handle);
                self.lifecycle = SessionState::Open;
                self.driver_version = driver.version().to_string();
                self.sdk_version = driver.sdk_version();
                info!(
                    "Opened meter {} ({} {}, serial {}, firmware {})",
                    self.name,
                    self.identity.make,
                    self.identity.model,
                    self.identity.serial_number,
                    self.identity.firmware_version
                );
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = handle.close() {
                    warn!("Failed to release {} after failed open: {}", self.name, close_err);
                }
                Err(e)
            }
        }
    }

    fn probe(&mut self, handle: &mut dyn MeterHandle) -> MeterResult<()> {
        self.identity = handle
            .identify()
            .map_err(|e| classify(e, "identifying meter"))?;
        let spectral = handle
            .spectral_capabilities()
            .map_err(|e| classify(e, "reading spectral capabilities"))?;
        if spectral.sample_count > MAX_SPECTRAL_SAMPLES || !spectral.is_representable() {
            return Err(MeterError::internal(format!(
                "meter {} reports an unusable spectral range: {} samples from {} nm in {} nm steps",
                self.name, spectral.sample_count, spectral.min_wavelength_nm, spectral.step_nm
            )));
        }
        self.spectral = Some(spectral);
        self.supported_modes = handle
            .supported_measurement_modes()
            .map_err(|e| classify(e, "listing measurement modes"))?
            .into_iter()
            .map(MeasurementMode::from_code)
            .collect::<Result<_, _>>()?;

        self.measurement_mode = MeasurementMode::from_code(
            handle
                .measurement_mode()
                .map_err(|e| classify(e, "getting measurement mode"))?,
        )?;
        self.observer = Observer::from_code(
            handle
                .observer()
                .map_err(|e| classify(e, "getting observer"))?,
        )?;
        self.color_space = ColorSpace::from_code(
            handle
                .color_space()
                .map_err(|e| classify(e, "getting color space"))?,
        )?;
        self.illuminant = Illuminant::from_code(
            handle
                .illuminant()
                .map_err(|e| classify(e, "getting illuminant"))?,
        )?;
        Ok(())
    }

    /// Release the driver handle. Idempotent.
    ///
    /// The session is closed even if the driver reports an error while
    /// releasing the handle; that error is still returned.
    pub fn close(&mut self) -> MeterResult<()> {
        if self.lifecycle == SessionState::Unopened {
            return Ok(());
        }
        self.lifecycle = SessionState::Closed;
        self.last_measurement = None;
        self.calibrations.clear();
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        info!("Closing meter {}", self.name);
        handle.close().map_err(|e| classify(e, "closing meter"))
    }

    // ─── Settings ───────────────────────────────────────────────────

    /// Modes the meter supports.
    pub fn supported_modes(&mut self) -> MeterResult<Vec<MeasurementMode>> {
        self.handle()?;
        Ok(self.supported_modes.clone())
    }

    /// Current measurement mode as reported by the driver.
    pub fn measurement_mode(&mut self) -> MeterResult<MeasurementMode> {
        let code = self
            .handle()?
            .measurement_mode()
            .map_err(|e| classify(e, "getting measurement mode"))?;
        let mode = MeasurementMode::from_code(code)?;
        if mode != self.measurement_mode {
            self.switch_mode(mode);
        }
        Ok(mode)
    }

    /// Select a measurement mode.
    ///
    /// `undefined` and modes the meter does not support are rejected before
    /// the driver is called. Once the driver accepts the mode the change
    /// sticks; failing to read the device's calibration for it afterwards is
    /// logged and leaves the mode uncalibrated.
    pub fn set_measurement_mode(&mut self, mode: MeasurementMode) -> MeterResult<()> {
        self.handle()?;
        if mode == MeasurementMode::Undefined {
            return Err(MeterError::invalid(format!(
                "measurement mode '{}' cannot be selected",
                mode.name()
            )));
        }
        if !self.supported_modes.contains(&mode) {
            return Err(MeterError::invalid(format!(
                "meter {} does not support the '{}' measurement mode",
                self.name,
                mode.name()
            )));
        }
        self.handle()?
            .set_measurement_mode(mode.code())
            .map_err(|e| classify(e, "setting measurement mode"))?;
        self.switch_mode(mode);
        self.configured = true;

        if !self.calibrations.contains_key(&mode) {
            if let Err(e) = self.adopt_device_calibration() {
                warn!(
                    "Meter {} switched to {} but its calibration is unknown: {}",
                    self.name, mode, e
                );
            }
        }
        debug!("Meter {} measurement mode {}", self.name, mode);
        Ok(())
    }

    fn switch_mode(&mut self, mode: MeasurementMode) {
        if mode != self.measurement_mode {
            self.last_measurement = None;
        }
        self.measurement_mode = mode;
    }

    /// Pick up a calibration the device already holds for the current mode.
    fn adopt_device_calibration(&mut self) -> MeterResult<()> {
        let times = self
            .handle()?
            .calibration_times()
            .map_err(|e| classify(e, "getting calibration times"))?;
        if let Some(times) = times.filter(|t| !t.until.is_zero()) {
            debug!(
                "Meter {} already calibrated for {} ({}s ago)",
                self.name,
                self.measurement_mode,
                times.since.as_secs()
            );
            self.calibrations.insert(
                self.measurement_mode,
                CalibrationWindow::from_times(times, Instant::now()),
            );
        }
        Ok(())
    }

    /// Current observer as reported by the driver.
    pub fn observer(&mut self) -> MeterResult<Observer> {
        let code = self
            .handle()?
            .observer()
            .map_err(|e| classify(e, "getting observer"))?;
        self.observer = Observer::from_code(code)?;
        Ok(self.observer)
    }

    /// Select an observer.
    pub fn set_observer(&mut self, observer: Observer) -> MeterResult<()> {
        self.handle()?
            .set_observer(observer.code())
            .map_err(|e| classify(e, "setting observer"))?;
        self.observer = observer;
        self.configured = true;
        Ok(())
    }

    /// Current color space as reported by the driver.
    pub fn color_space(&mut self) -> MeterResult<ColorSpace> {
        let code = self
            .handle()?
            .color_space()
            .map_err(|e| classify(e, "getting color space"))?;
        self.color_space = ColorSpace::from_code(code)?;
        Ok(self.color_space)
    }

    /// Select a color space.
    pub fn set_color_space(&mut self, color_space: ColorSpace) -> MeterResult<()> {
        self.handle()?
            .set_color_space(color_space.code())
            .map_err(|e| classify(e, "setting color space"))?;
        self.color_space = color_space;
        self.configured = true;
        Ok(())
    }

    /// Current illuminant as reported by the driver.
    pub fn illuminant(&mut self) -> MeterResult<Illuminant> {
        let code = self
            .handle()?
            .illuminant()
            .map_err(|e| classify(e, "getting illuminant"))?;
        self.illuminant = Illuminant::from_code(code)?;
        Ok(self.illuminant)
    }

    /// Select an illuminant.
    pub fn set_illuminant(&mut self, illuminant: Illuminant) -> MeterResult<()> {
        self.handle()?
            .set_illuminant(illuminant.code())
            .map_err(|e| classify(e, "setting illuminant"))?;
        self.illuminant = illuminant;
        self.configured = true;
        Ok(())
    }

    // ─── Calibration and measurement ────────────────────────────────

    /// Calibrate the current measurement mode.
    ///
    /// With `wait_for_user` set this blocks until the device reports the
    /// calibration button was pressed.
    pub fn calibrate(&mut self, wait_for_user: bool) -> MeterResult<()> {
        self.handle()?;
        let mode = self.measurement_mode;
        if mode == MeasurementMode::Undefined {
            return Err(MeterError::invalid(format!(
                "meter {} has no measurement mode set",
                self.name
            )));
        }

        info!("Calibrating meter {} for {}", self.name, mode);
        let handle = self.handle()?;
        handle
            .calibrate(wait_for_user)
            .map_err(|e| classify(e, "calibrating"))?;
        let times = handle
            .calibration_times()
            .map_err(|e| classify(e, "getting calibration times"))?;
        let times = times.ok_or_else(|| {
            MeterError::unavailable(format!(
                "meter {} reported no calibration after calibrating",
                self.name
            ))
        })?;
        self.calibrations
            .insert(mode, CalibrationWindow::from_times(times, Instant::now()));
        Ok(())
    }

    /// Calibration age of the current mode, `None` if never calibrated.
    pub fn calibration_times(&mut self) -> MeterResult<Option<CalibrationAge>> {
        self.handle()?;
        let now = Instant::now();
        Ok(self.current_window().map(|w| w.age_at(now)))
    }

    /// Calibration age of `mode`, `None` if it was never calibrated.
    ///
    /// Does not touch the device or change the current mode.
    pub fn calibration_times_for(
        &mut self,
        mode: MeasurementMode,
    ) -> MeterResult<Option<CalibrationAge>> {
        self.handle()?;
        let now = Instant::now();
        Ok(self.calibration_window(mode).map(|w| w.age_at(now)))
    }

    /// Calibration window of `mode`, if one was recorded.
    pub fn calibration_window(&self, mode: MeasurementMode) -> Option<CalibrationWindow> {
        self.calibrations.get(&mode).copied()
    }

    /// Take a measurement in the current mode and cache it.
    ///
    /// Fails `Unavailable` without calling the driver if the current mode's
    /// calibration is missing or expired.
    pub fn trigger(&mut self) -> MeterResult<&Measurement> {
        self.handle()?;
        let mode = self.measurement_mode;
        match self.current_window() {
            None => {
                return Err(MeterError::unavailable(format!(
                    "meter {} is not calibrated for {}; calibration required",
                    self.name, mode
                )));
            }
            Some(window) if !window.is_valid_at(Instant::now()) => {
                return Err(MeterError::unavailable(format!(
                    "calibration of meter {} for {} expired; recalibration required",
                    self.name, mode
                )));
            }
            Some(_) => {}
        }

        let handle = self.handle()?;
        handle
            .trigger()
            .map_err(|e| classify(e, "triggering measurement"))?;
        let tristimulus = handle
            .colorimetry()
            .map_err(|e| classify(e, "reading colorimetry"))?;
        let spectrum = handle
            .spectrum()
            .map_err(|e| classify(e, "reading spectrum"))?;

        let spectral = self.spectral.ok_or_else(|| {
            MeterError::internal(format!("meter {} has no spectral capabilities", self.name))
        })?;
        if spectrum.len() != spectral.sample_count {
            return Err(MeterError::internal(format!(
                "meter {} returned {} spectral samples, expected {}",
                self.name,
                spectrum.len(),
                spectral.sample_count
            )));
        }

        self.measurement_count += 1;
        debug!(
            "Meter {} measurement #{} in {}",
            self.name, self.measurement_count, mode
        );
        Ok(&*self.last_measurement.insert(Measurement {
            meter: self.name.clone(),
            sequence: self.measurement_count,
            measurement_mode: mode,
            observer: self.observer,
            color_space: self.color_space,
            illuminant: self.illuminant,
            tristimulus,
            spectrum,
            wavelengths: spectral.wavelengths().collect(),
        }))
    }

    /// Last measurement, or `Unavailable` before the first trigger.
    pub fn last_measurement(&mut self) -> MeterResult<&Measurement> {
        self.handle()?;
        let name = &self.name;
        self.last_measurement.as_ref().ok_or_else(|| {
            MeterError::unavailable(format!(
                "no measurement available from meter {name}; trigger first"
            ))
        })
    }

    /// Colorimetry of the last measurement.
    pub fn read_colorimetry(&mut self) -> MeterResult<Tristimulus> {
        Ok(self.last_measurement()?.tristimulus)
    }

    /// Spectrum of the last measurement.
    pub fn read_spectrum(&mut self) -> MeterResult<Vec<f64>> {
        Ok(self.last_measurement()?.spectrum.clone())
    }

    /// Summary of the session.
    pub fn info(&self) -> SessionInfo {
        let now = Instant::now();
        SessionInfo {
            name: self.name.clone(),
            state: self.state(),
            identity: self.identity.clone(),
            spectral: self.spectral,
            supported_modes: self.supported_modes.clone(),
            measurement_mode: self.measurement_mode,
            observer: self.observer,
            color_space: self.color_space,
            illuminant: self.illuminant,
            calibration: self.current_window().map(|w| w.age_at(now)),
            measurement_count: self.measurement_count,
            driver_version: self.driver_version.clone(),
            sdk_version: self.sdk_version.clone(),
        }
    }
}

impl std::fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("measurement_mode", &self.measurement_mode)
            .field("measurement_count", &self.measurement_count)
            .finish_non_exhaustive()
    }
}
