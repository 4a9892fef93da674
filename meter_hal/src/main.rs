//! # Meter HAL Binary
//!
//! Command-line front end of the instrument session registry: list attached
//! meters, show what one reports, and run measurement sequences that are
//! printed as JSON lines.
//!
//! # Usage
//!
//! ```bash
//! # List meters on the simulated bench
//! meter_hal list
//!
//! # Identity, capabilities and settings of one meter
//! meter_hal --config meter.toml info i1pro-1
//!
//! # Ten reflective measurements, one per second, into a file
//! meter_hal measure i1pro-1 --mode reflective --count 10 --interval-ms 1000 --output run.jsonl
//!
//! # Verbose JSON logs on stderr
//! meter_hal -v --json measure i1pro-1 --mode emissive
//! ```

use clap::{Parser, Subcommand};
use meter_common::config::{ConfigError, ConfigLoader, LogLevel, MeterConfig};
use meter_common::consts::DEFAULT_CONFIG_PATH;
use meter_common::error::ErrorKind;
use meter_hal::{DriverRegistry, MeterService};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Meter HAL - instrument session registry with pluggable drivers
#[derive(Parser, Debug)]
#[command(name = "meter_hal")]
#[command(version)]
#[command(about = "Instrument session registry with pluggable driver architecture")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file (meter.toml).
    /// Defaults are used if the default path does not exist.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Driver to load (overrides the configuration)
    #[arg(short, long)]
    driver: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached meters
    List,

    /// Open a meter and print its identity, capabilities and settings
    Info {
        /// Meter name
        name: String,
    },

    /// Print the symbolic names of every capability family
    Capabilities,

    /// Run a measurement sequence and print one JSON line per measurement
    Measure(MeasureArgs),
}

#[derive(clap::Args, Debug)]
struct MeasureArgs {
    /// Meter name
    name: String,

    /// Measurement mode (e.g. emissive, ambient, reflective)
    #[arg(long)]
    mode: Option<String>,

    /// Standard observer (two-degree-1931, ten-degree-1964)
    #[arg(long)]
    observer: Option<String>,

    /// Color space (e.g. CIEXYZ, CIELab)
    #[arg(long)]
    color_space: Option<String>,

    /// Illuminant (e.g. D50, D65)
    #[arg(long)]
    illuminant: Option<String>,

    /// Number of measurements (0 runs until interrupted)
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u64,

    /// Delay between measurements, in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// Wait for the calibration button press
    #[arg(long)]
    wait_for_user: bool,

    /// Write measurements to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() {
    if let Err(e) = run() {
        error!("meter_hal failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args);
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);
    let mut config = config?;
    config.validate()?;

    if let Some(driver) = &args.driver {
        config.driver = driver.clone();
    }

    info!(
        "{} v{} starting with driver {}",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION"),
        config.driver
    );

    let drivers = DriverRegistry::with_builtin_drivers();
    let service = MeterService::from_config(&config, &drivers)?;

    let result = match &args.command {
        Command::List => list(&service),
        Command::Info { name } => show_info(&service, name),
        Command::Capabilities => print_json(&mut io::stdout().lock(), &service.capabilities()),
        Command::Measure(measure_args) => measure(&service, measure_args),
    };

    service.shutdown()?;
    info!("meter_hal shutdown complete");
    result
}

/// Load the configuration named on the command line, or the default one.
fn load_config(args: &Args) -> Result<MeterConfig, ConfigError> {
    match &args.config {
        Some(path) => MeterConfig::load(path),
        None => match MeterConfig::load(std::path::Path::new(DEFAULT_CONFIG_PATH)) {
            Err(ConfigError::FileNotFound) => Ok(MeterConfig::default()),
            other => other,
        },
    }
}

fn list(service: &MeterService) -> Result<(), Box<dyn std::error::Error>> {
    let names = service.enumerate()?;
    info!("Found {} meters", names.len());
    let mut out = io::stdout().lock();
    for (name, state) in service.sessions() {
        print_json(
            &mut out,
            &serde_json::json!({ "name": name, "state": state }),
        )?;
    }
    Ok(())
}

fn show_info(service: &MeterService, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let info = service.open(name)?;
    print_json(&mut io::stdout().lock(), &info)
}

fn measure(service: &MeterService, args: &MeasureArgs) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    let name = args.name.as_str();
    service.open(name)?;
    if let Some(mode) = &args.mode {
        service.set_measurement_mode(name, mode)?;
    }
    if let Some(observer) = &args.observer {
        service.set_observer(name, observer)?;
    }
    if let Some(color_space) = &args.color_space {
        service.set_color_space(name, color_space)?;
    }
    if let Some(illuminant) = &args.illuminant {
        service.set_illuminant(name, illuminant)?;
    }

    let needs_calibration = service
        .get_calibration_times(name)?
        .is_none_or(|age| age.seconds_until_expiry == 0);
    if needs_calibration {
        calibrate(service, name, args.wait_for_user)?;
    }

    let mut taken = 0u64;
    while running.load(Ordering::SeqCst) && (args.count == 0 || taken < args.count) {
        if taken > 0 && !sleep_while_running(&running, Duration::from_millis(args.interval_ms)) {
            break;
        }

        match service.trigger(name) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Unavailable && e.driver_error().is_none() => {
                warn!("{}", e);
                calibrate(service, name, args.wait_for_user)?;
                service.trigger(name)?;
            }
            Err(e) => return Err(e.into()),
        }

        print_json(&mut out, &service.last_measurement(name)?)?;
        taken += 1;
    }

    out.flush()?;
    info!("Took {} measurements with {}", taken, name);
    Ok(())
}

fn calibrate(
    service: &MeterService,
    name: &str,
    wait_for_user: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if wait_for_user {
        info!("Place {} on the calibration tile and press its button", name);
    }
    service.calibrate(name, wait_for_user)?;
    Ok(())
}

/// Sleep up to `duration`, returning early (false) once `running` clears.
fn sleep_while_running(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
    false
}

fn print_json<W: Write + ?Sized, T: Serialize>(
    out: &mut W,
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
///
/// Logs go to stderr so stdout carries only JSON lines.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        "debug"
    } else {
        configured.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}
