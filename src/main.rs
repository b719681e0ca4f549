// Sylva binary entry point
// Loads configuration, establishes a device identity, wires the hardware
// (or mock) capabilities into the monitor, and runs until interrupted.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use thiserror::Error;

use sylva::audio::capture::{CaptureDevice, CaptureError, CpalCapture, MockCapture};
use sylva::config::{Config, ConfigError};
use sylva::detect::ml::{InferenceEngine, TractModel};
use sylva::identity::{self, DeviceIdentity, IdentityError};
use sylva::monitor::{Monitor, MonitorConfig, MockTrigger, SysfsGpioTrigger, TriggerSource};
use sylva::report::{HttpReportChannel, ReportChannel, ReportError, ReportingGateway};

const IDENTITY_FILE: &str = "device_identity.json";

#[derive(Parser)]
#[command(name = "sylva", about = "Forest monitoring: acoustic chainsaw detection")]
struct Args {
    /// Run with mock sensor and recorder (no hardware required)
    #[arg(long)]
    mock: bool,

    /// Path to the configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// WAV file replayed by the mock recorder
    #[arg(long, requires = "mock")]
    mock_audio: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum SystemError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    // No identity means no event can ever be reported; this is fatal
    #[error("Could not establish device identity: {0}")]
    Registration(#[from] ReportError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), SystemError> {
    let config = Config::load(&args.config)?;
    let channel = HttpReportChannel::new(&config.base_url)?;
    let identity = load_or_register(&channel, &config)?;

    log::info!(
        "Device {} at ({}, {}), mode: {}",
        identity.device_id,
        config.latitude,
        config.longitude,
        if args.mock { "MOCK" } else { "HARDWARE" }
    );

    let (capture, trigger): (Box<dyn CaptureDevice>, Box<dyn TriggerSource>) = if args.mock {
        log::warn!("Running in mock mode, no hardware required");
        let capture: Box<dyn CaptureDevice> = match &args.mock_audio {
            Some(path) => Box::new(MockCapture::from_wav(path)?),
            None => Box::new(MockCapture::empty(config.sample_rate, config.channels)),
        };
        // Simulate a single sound event
        (capture, Box::new(MockTrigger::from_sequence(vec![true])))
    } else {
        (
            Box::new(CpalCapture::new(config.audio_device.clone())),
            Box::new(SysfsGpioTrigger::new(config.sensor_pin)),
        )
    };

    // A missing or broken model degrades to DSP-only operation
    let inference: Option<Box<dyn InferenceEngine>> = match &config.ml_model_path {
        Some(path) => match TractModel::load(path) {
            Ok(model) => Some(Box::new(model)),
            Err(e) => {
                log::warn!("ML model unavailable, continuing DSP-only: {}", e);
                None
            }
        },
        None => None,
    };

    let gateway = ReportingGateway::new(Box::new(channel), config.latitude, config.longitude);
    let mut monitor = Monitor::new(
        MonitorConfig::from(&config),
        capture,
        inference,
        gateway,
        identity,
    );

    let shutdown = monitor.shutdown_handle();
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested");
        shutdown.store(true, Ordering::SeqCst);
    })?;

    monitor.run(trigger);
    Ok(())
}

/// Load the persisted identity, or register this device with the collector.
/// Failure to do either is the only fatal startup condition.
fn load_or_register(
    channel: &HttpReportChannel,
    config: &Config,
) -> Result<DeviceIdentity, SystemError> {
    match identity::load(Path::new(IDENTITY_FILE)) {
        Ok(Some(id)) => return Ok(id),
        Ok(None) => log::info!("No device identity found, registering new device"),
        Err(e) => log::warn!("Failed to load device identity ({}), re-registering", e),
    }

    let id = channel.register(config.latitude, config.longitude)?;
    identity::store(&id, Path::new(IDENTITY_FILE))?;
    Ok(id)
}
