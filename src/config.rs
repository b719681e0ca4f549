// Runtime configuration
// Every option falls back to its default individually, so a partial config
// file only overrides what it names. A missing file is not an error.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device location reported with every alert
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,

    /// GPIO pin (BCM numbering) of the sound trigger
    #[serde(default = "default_sensor_pin")]
    pub sensor_pin: u32,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Capture window per trigger, seconds
    #[serde(default = "default_recording_duration")]
    pub recording_duration: u64,

    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,

    /// Named cpal input device; None picks the default
    #[serde(default)]
    pub audio_device: Option<String>,

    /// DSP energy threshold — the primary tuning surface for detection
    #[serde(default = "default_chainsaw_threshold")]
    pub chainsaw_threshold: f32,

    #[serde(default = "default_bandpass_low")]
    pub bandpass_low: f32,
    #[serde(default = "default_bandpass_high")]
    pub bandpass_high: f32,

    /// ML confidence threshold in [0,1]
    #[serde(default = "default_ml_threshold")]
    pub ml_threshold: f32,

    /// ONNX model path; None runs DSP-only
    #[serde(default)]
    pub ml_model_path: Option<PathBuf>,

    /// Trigger poll interval, milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Collector endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_latitude() -> f64 {
    52.2297
}
fn default_longitude() -> f64 {
    21.0122
}
fn default_sensor_pin() -> u32 {
    17
}
fn default_sample_rate() -> u32 {
    48000
}
fn default_channels() -> u16 {
    2
}
fn default_recording_duration() -> u64 {
    10
}
fn default_recordings_dir() -> PathBuf {
    PathBuf::from("recordings")
}
fn default_chainsaw_threshold() -> f32 {
    1000.0
}
fn default_bandpass_low() -> f32 {
    500.0
}
fn default_bandpass_high() -> f32 {
    8000.0
}
fn default_ml_threshold() -> f32 {
    0.5
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_base_url() -> String {
    "https://uynrsnmjoe.execute-api.eu-north-1.amazonaws.com".to_string()
}

impl Default for Config {
    fn default() -> Self {
        // An empty JSON object takes every field's default
        serde_json::from_str("{}").unwrap()
    }
}

impl Config {
    /// Load from a JSON file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            log::warn!(
                "No config file at {}, using default configuration",
                path.display()
            );
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        log::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }
}
