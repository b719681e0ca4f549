// Captured audio representation
// One Waveform is created per trigger cycle and dropped once analysis is done

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("Failed to encode WAV: {0}")]
    WavEncode(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw captured audio: interleaved f32 samples in [-1.0, 1.0]
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Waveform {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Convert to mono by averaging interleaved channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks(self.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    /// Encode as 16-bit PCM mono WAV bytes
    pub fn to_wav(&self) -> Result<Vec<u8>, hound::Error> {
        let spec = hound::WavSpec {
            channels: 1, // Always mono for transport
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for sample in self.to_mono() {
                let int_sample = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(int_sample)?;
            }
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }

    /// Write a timestamped WAV file into `dir` and return its path
    pub fn save(&self, dir: &Path) -> Result<PathBuf, WaveformError> {
        fs::create_dir_all(dir)?;

        let filename = format!("recording_{}.wav", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(filename);
        fs::write(&path, self.to_wav()?)?;

        log::info!("Recording saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_mono_averages_channels() {
        let wave = Waveform::new(vec![0.5, 0.3, 0.4, 0.2], 44100, 2);
        let mono = wave.to_mono();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.4).abs() < 0.01);
        assert!((mono[1] - 0.3).abs() < 0.01);
    }

    #[test]
    fn test_mono_passthrough() {
        let wave = Waveform::new(vec![0.1, 0.2, 0.3], 48000, 1);
        assert_eq!(wave.to_mono(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_duration() {
        let wave = Waveform::new(vec![0.0; 96000], 48000, 2);
        assert!((wave.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_to_wav_header() {
        let wave = Waveform::new(vec![0.0; 100], 22050, 1);
        let bytes = wave.to_wav().unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn test_save_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let wave = Waveform::new(vec![0.0; 64], 22050, 1);
        let path = wave.save(dir.path()).unwrap();
        assert!(path.exists());
        assert!(path.extension().is_some_and(|e| e == "wav"));
    }
}
