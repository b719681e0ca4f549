// Feature-tensor builder
// Turns a raw waveform into the fixed-shape normalized mel-spectrogram image
// the inference model was trained on. Every constant in the normalization
// step is part of the model contract, not a tuning knob.

use realfft::RealFftPlanner;
use thiserror::Error;

use crate::audio::waveform::Waveform;

/// STFT frame size used for the mel spectrogram
const N_FFT: usize = 2048;

/// Hop between successive STFT frames
const HOP_SIZE: usize = 512;

/// Floor for the log-magnitude scale, in dB below the spectrogram peak
const DB_FLOOR: f32 = -80.0;

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("Cannot resample from {0} Hz")]
    UnsupportedSampleRate(u32),
}

/// Shape and calibration of the model input
#[derive(Debug, Clone)]
pub struct TensorConfig {
    /// Analysis window the model expects, in seconds
    pub target_duration_secs: f32,

    /// Sample rate the model was trained at
    pub model_sample_rate: u32,

    /// Mel bins (image height)
    pub grid_height: usize,

    /// Time steps (image width)
    pub grid_width: usize,

    /// Upper bound of the mel filterbank (Hz)
    pub max_frequency: f32,
}

impl Default for TensorConfig {
    fn default() -> Self {
        TensorConfig {
            target_duration_secs: 3.0,
            model_sample_rate: 22050,
            grid_height: 128,
            grid_width: 128,
            max_frequency: 8000.0,
        }
    }
}

/// Normalized model input of logical shape [1, height, width, 3]
///
/// Values are stored row-major with the channel axis innermost; all three
/// channels replicate the same mel-spectrogram plane.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    values: Vec<f32>,
    height: usize,
    width: usize,
}

impl FeatureTensor {
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height, self.width, 3]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Build the model input tensor from a raw waveform
///
/// The waveform is mixed down to mono, resampled to the model rate, padded
/// with silence or truncated to exactly the target duration, run through an
/// STFT + mel filterbank, converted to dB, resized to the configured grid,
/// and mapped into [0,1] by the fixed `(x + 80) / 80` calibration.
pub fn build(waveform: &Waveform, cfg: &TensorConfig) -> Result<FeatureTensor, TensorError> {
    if waveform.sample_rate == 0 {
        return Err(TensorError::UnsupportedSampleRate(waveform.sample_rate));
    }

    let mono = waveform.to_mono();
    let mut samples = resample_linear(&mono, waveform.sample_rate, cfg.model_sample_rate);

    // Standardize length: pad with silence or truncate to the target window
    let target_len = (cfg.target_duration_secs * cfg.model_sample_rate as f32) as usize;
    samples.resize(target_len, 0.0);

    let power = stft_power(&samples);
    let filterbank = mel_filter_bank(
        cfg.model_sample_rate,
        N_FFT / 2 + 1,
        cfg.grid_height,
        cfg.max_frequency,
    );

    // Mel energies per frame: grid[mel][frame]
    let n_frames = power.len();
    let mut grid = vec![vec![0.0f32; n_frames]; cfg.grid_height];
    for (frame_idx, frame) in power.iter().enumerate() {
        for (mel_idx, filt) in filterbank.iter().enumerate() {
            grid[mel_idx][frame_idx] = filt
                .iter()
                .zip(frame.iter())
                .map(|(f, &p)| f * p)
                .sum::<f32>();
        }
    }

    power_to_db(&mut grid);
    let resized = resize_bilinear(&grid, cfg.grid_height, cfg.grid_width);

    // Fixed affine mapping into [0,1], then replicate into 3 channels with a
    // leading batch dimension
    let mut values = Vec::with_capacity(cfg.grid_height * cfg.grid_width * 3);
    for row in &resized {
        for &v in row {
            let normalized = ((v + 80.0) / 80.0).clamp(0.0, 1.0);
            values.extend_from_slice(&[normalized, normalized, normalized]);
        }
    }

    Ok(FeatureTensor {
        values,
        height: cfg.grid_height,
        width: cfg.grid_width,
    })
}

/// Linear-interpolation resampler
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).round() as usize;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Compute the power spectrogram: one Vec of N_FFT/2+1 power values per frame
fn stft_power(samples: &[f32]) -> Vec<Vec<f32>> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(N_FFT);

    let window: Vec<f32> = (0..N_FFT)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / N_FFT as f32).cos()))
        .collect();

    let n_frames = if samples.len() >= N_FFT {
        1 + (samples.len() - N_FFT) / HOP_SIZE
    } else {
        1
    };

    let mut frames = Vec::with_capacity(n_frames);
    let mut input = vec![0.0f32; N_FFT];
    let mut spectrum = fft.make_output_vec();

    for frame_idx in 0..n_frames {
        let start = frame_idx * HOP_SIZE;

        input.fill(0.0);
        let copy_len = samples.len().saturating_sub(start).min(N_FFT);
        input[..copy_len].copy_from_slice(&samples[start..start + copy_len]);
        for (s, w) in input.iter_mut().zip(window.iter()) {
            *s *= w;
        }

        fft.process(&mut input, &mut spectrum).unwrap();
        frames.push(spectrum.iter().map(|c| c.norm_sqr()).collect());
    }

    frames
}

/// Triangular mel filterbank covering 0..max_freq Hz
fn mel_filter_bank(
    sample_rate: u32,
    mag_bins: usize,
    mel_bins: usize,
    max_freq: f32,
) -> Vec<Vec<f32>> {
    let f_max = max_freq.min(sample_rate as f32 / 2.0);
    let mel_max = freq_to_mel(f_max);
    let mel_step = mel_max / (mel_bins + 1) as f32;

    let center_freqs: Vec<f32> = (0..=mel_bins + 1)
        .map(|i| mel_to_freq(i as f32 * mel_step))
        .collect();

    let bin_width = (sample_rate as f32 / 2.0) / (mag_bins - 1) as f32;
    let mut bank = vec![vec![0.0f32; mag_bins]; mel_bins];

    for (i, filt) in bank.iter_mut().enumerate() {
        let f_left = center_freqs[i];
        let f_center = center_freqs[i + 1];
        let f_right = center_freqs[i + 2];

        for (bin, amp) in filt.iter_mut().enumerate() {
            let freq = bin as f32 * bin_width;
            *amp = if freq < f_left || freq > f_right {
                0.0
            } else if freq <= f_center {
                (freq - f_left) / (f_center - f_left)
            } else {
                (f_right - freq) / (f_right - f_center)
            };
        }
    }

    bank
}

#[inline]
fn freq_to_mel(f: f32) -> f32 {
    1127.0 * (1.0 + f / 700.0).ln()
}

#[inline]
fn mel_to_freq(m: f32) -> f32 {
    700.0 * ((m / 1127.0).exp() - 1.0)
}

/// Convert power values to dB relative to the grid maximum, floored at -80 dB
fn power_to_db(grid: &mut [Vec<f32>]) {
    let max_power = grid
        .iter()
        .flat_map(|row| row.iter())
        .fold(1e-10f32, |acc, &v| acc.max(v));

    for row in grid.iter_mut() {
        for v in row.iter_mut() {
            let db = 10.0 * (v.max(1e-10) / max_power).log10();
            *v = db.max(DB_FLOOR);
        }
    }
}

/// Bilinear resize of a [rows][cols] grid to out_rows x out_cols
fn resize_bilinear(grid: &[Vec<f32>], out_rows: usize, out_cols: usize) -> Vec<Vec<f32>> {
    let in_rows = grid.len();
    let in_cols = grid[0].len();

    let row_scale = in_rows as f32 / out_rows as f32;
    let col_scale = in_cols as f32 / out_cols as f32;

    let sample = |r: usize, c: usize| grid[r.min(in_rows - 1)][c.min(in_cols - 1)];

    (0..out_rows)
        .map(|out_r| {
            let src_r = (out_r as f32 + 0.5) * row_scale - 0.5;
            let r0 = src_r.floor().max(0.0) as usize;
            let rf = (src_r - r0 as f32).clamp(0.0, 1.0);

            (0..out_cols)
                .map(|out_c| {
                    let src_c = (out_c as f32 + 0.5) * col_scale - 0.5;
                    let c0 = src_c.floor().max(0.0) as usize;
                    let cf = (src_c - c0 as f32).clamp(0.0, 1.0);

                    let top = sample(r0, c0) * (1.0 - cf) + sample(r0, c0 + 1) * cf;
                    let bottom = sample(r0 + 1, c0) * (1.0 - cf) + sample(r0 + 1, c0 + 1) * cf;
                    top * (1.0 - rf) + bottom * rf
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_wave(secs: f32, sample_rate: u32) -> Waveform {
        // Deterministic pseudo-noise: sum of detuned sines
        let n = (sample_rate as f32 * secs) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * 1234.5 * t).sin() * 0.4
                    + (2.0 * std::f32::consts::PI * 3456.7 * t).sin() * 0.3
            })
            .collect();
        Waveform::new(samples, sample_rate, 1)
    }

    #[test]
    fn test_shape_is_fixed_for_any_input_length() {
        let cfg = TensorConfig::default();

        // Shorter than, equal to, and 3x the target window
        for secs in [1.0, 3.0, 9.0] {
            let tensor = build(&noise_wave(secs, 22050), &cfg).unwrap();
            assert_eq!(tensor.shape(), [1, 128, 128, 3]);
            assert_eq!(tensor.values().len(), 128 * 128 * 3);
        }
    }

    #[test]
    fn test_values_in_unit_range() {
        let cfg = TensorConfig::default();
        let tensor = build(&noise_wave(3.0, 22050), &cfg).unwrap();
        assert!(tensor.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_channels_are_replicated() {
        let cfg = TensorConfig::default();
        let tensor = build(&noise_wave(2.0, 22050), &cfg).unwrap();
        for pixel in tensor.values().chunks(3) {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn test_resamples_foreign_rates() {
        let cfg = TensorConfig::default();
        let tensor = build(&noise_wave(3.0, 48000), &cfg).unwrap();
        assert_eq!(tensor.shape(), [1, 128, 128, 3]);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let wave = Waveform::new(vec![0.0; 100], 0, 1);
        assert!(matches!(
            build(&wave, &TensorConfig::default()),
            Err(TensorError::UnsupportedSampleRate(0))
        ));
    }

    #[test]
    fn test_build_is_deterministic() {
        let cfg = TensorConfig::default();
        let wave = noise_wave(3.0, 22050);
        let a = build(&wave, &cfg).unwrap();
        let b = build(&wave, &cfg).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resample_halves_length() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = resample_linear(&samples, 44100, 22050);
        assert!((out.len() as i64 - 500).abs() <= 1);
    }

    #[test]
    fn test_mel_bank_rows_cover_band() {
        let bank = mel_filter_bank(22050, 1025, 64, 8000.0);
        assert_eq!(bank.len(), 64);
        // Every filter has some nonzero weight
        assert!(bank.iter().all(|f| f.iter().any(|&w| w > 0.0)));
    }
}
