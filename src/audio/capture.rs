// Audio capture devices
// CaptureDevice is the seam between the event cycle and the microphone:
// hardware capture goes through cpal, tests and --mock runs use MockCapture

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use hound::{SampleFormat as WavSampleFormat, WavReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::audio::waveform::Waveform;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("Requested input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Failed to get input config: {0}")]
    Config(String),

    #[error("Failed to build input stream: {0}")]
    Stream(String),

    #[error("Failed to read WAV file: {0}")]
    WavRead(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

/// A source of recorded audio
///
/// `capture` blocks for up to `duration`, honoring `cancel` at its polling
/// interval; on cancellation it returns whatever was recorded so far.
pub trait CaptureDevice: Send {
    fn capture(&mut self, duration: Duration, cancel: &AtomicBool) -> Result<Waveform, CaptureError>;
}

/// Hardware capture through the default (or named) cpal input device
pub struct CpalCapture {
    device_name: Option<String>,
}

impl CpalCapture {
    pub fn new(device_name: Option<String>) -> Self {
        CpalCapture { device_name }
    }

    fn find_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();

        match &self.device_name {
            None => host.default_input_device().ok_or(CaptureError::NoInputDevice),
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::Config(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.clone())),
        }
    }
}

impl CaptureDevice for CpalCapture {
    fn capture(&mut self, duration: Duration, cancel: &AtomicBool) -> Result<Waveform, CaptureError> {
        let device = self.find_device()?;
        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::Config(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let samples: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let err_fn = |err| log::error!("Capture stream error: {}", err);

        let stream = match config.sample_format() {
            SampleFormat::F32 => {
                let samples = Arc::clone(&samples);
                device.build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &_| {
                        samples.lock().unwrap().extend_from_slice(data);
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let samples = Arc::clone(&samples);
                device.build_input_stream(
                    &config.into(),
                    move |data: &[i16], _: &_| {
                        let floats: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                        samples.lock().unwrap().extend_from_slice(&floats);
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let samples = Arc::clone(&samples);
                device.build_input_stream(
                    &config.into(),
                    move |data: &[u16], _: &_| {
                        let floats: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                        samples.lock().unwrap().extend_from_slice(&floats);
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(CaptureError::UnsupportedFormat(format!("{:?}", other)));
            }
        }
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

        stream.play().map_err(|e| CaptureError::Stream(e.to_string()))?;

        // Wait out the capture window in short slices so shutdown stays responsive
        let started = Instant::now();
        while started.elapsed() < duration {
            if cancel.load(Ordering::SeqCst) {
                log::info!("Capture cancelled after {:?}", started.elapsed());
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }

        drop(stream);

        let recorded = std::mem::take(&mut *samples.lock().unwrap());
        log::debug!("Captured {} samples at {} Hz", recorded.len(), sample_rate);

        Ok(Waveform::new(recorded, sample_rate, channels))
    }
}

/// Deterministic capture device for tests and --mock runs
///
/// Returns a fixed waveform on every capture (or an empty one, to exercise
/// the empty-capture path).
pub struct MockCapture {
    waveform: Waveform,
}

impl MockCapture {
    pub fn new(waveform: Waveform) -> Self {
        MockCapture { waveform }
    }

    /// Mock that produces no samples at all
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        MockCapture {
            waveform: Waveform::new(Vec::new(), sample_rate, channels),
        }
    }

    /// Mock that replays an existing WAV recording
    pub fn from_wav(path: &Path) -> Result<Self, CaptureError> {
        Ok(MockCapture {
            waveform: load_wav(path)?,
        })
    }
}

impl CaptureDevice for MockCapture {
    fn capture(&mut self, _duration: Duration, _cancel: &AtomicBool) -> Result<Waveform, CaptureError> {
        Ok(self.waveform.clone())
    }
}

/// Read a WAV file into a normalized f32 waveform
pub fn load_wav(path: &Path) -> Result<Waveform, CaptureError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (WavSampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (WavSampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (WavSampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<Result<_, _>>()?,
        (WavSampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<Result<_, _>>()?,
        (fmt, bits) => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "{:?} {}-bit",
                fmt, bits
            )));
        }
    };

    Ok(Waveform::new(samples, spec.sample_rate, spec.channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_capture_returns_fixed_waveform() {
        let wave = Waveform::new(vec![0.1, 0.2, 0.3], 22050, 1);
        let mut mock = MockCapture::new(wave.clone());

        let cancel = AtomicBool::new(false);
        let out = mock.capture(Duration::from_secs(10), &cancel).unwrap();
        assert_eq!(out.samples, wave.samples);
        assert_eq!(out.sample_rate, 22050);
    }

    #[test]
    fn test_mock_capture_empty() {
        let mut mock = MockCapture::empty(48000, 2);
        let cancel = AtomicBool::new(false);
        let out = mock.capture(Duration::from_secs(1), &cancel).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_wav_round_trip_through_mock() {
        let dir = tempfile::tempdir().unwrap();
        let wave = Waveform::new(vec![0.25; 200], 22050, 1);
        let path = wave.save(dir.path()).unwrap();

        let mut mock = MockCapture::from_wav(&path).unwrap();
        let cancel = AtomicBool::new(false);
        let out = mock.capture(Duration::from_secs(1), &cancel).unwrap();

        assert_eq!(out.sample_rate, 22050);
        assert_eq!(out.samples.len(), 200);
        assert!((out.samples[0] - 0.25).abs() < 0.001);
    }
}
