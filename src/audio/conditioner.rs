// Signal conditioning: band-limiting filter + FFT spectral summary
// Chainsaw energy concentrates in the 500-8000 Hz band; everything outside
// it is attenuated before the energy threshold is applied

use realfft::RealFftPlanner;
use thiserror::Error;

use crate::audio::waveform::Waveform;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("Invalid passband {low}-{high} Hz for Nyquist {nyquist} Hz")]
    InvalidBand { low: f32, high: f32, nyquist: f32 },

    #[error("Cannot condition an empty waveform")]
    EmptyWaveform,
}

/// Band-limited mono signal, same length and sample rate as its source
#[derive(Debug, Clone)]
pub struct ConditionedSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Frequency-domain summary of a conditioned signal
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralSummary {
    /// Frequency of the strongest spectral component (Hz)
    pub peak_frequency: f32,

    /// Magnitude at the peak frequency
    pub peak_amplitude: f32,

    /// Mean magnitude across the positive-frequency half of the spectrum
    pub average_energy: f32,

    /// Signal duration in seconds
    pub duration: f64,
}

/// Second-order IIR section (RBJ cookbook coefficients, normalized by a0)
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn highpass(sample_rate: f32, cutoff: f32) -> Self {
        let w0 = 2.0 * std::f32::consts::PI * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        // Butterworth Q = 1/sqrt(2)
        let alpha = sin_w0 / (2.0 * std::f32::consts::FRAC_1_SQRT_2);
        let a0 = 1.0 + alpha;

        Biquad {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn lowpass(sample_rate: f32, cutoff: f32) -> Self {
        let w0 = 2.0 * std::f32::consts::PI * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * std::f32::consts::FRAC_1_SQRT_2);
        let a0 = 1.0 + alpha;

        Biquad {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            let x0 = *s;
            let y0 = self.b0 * x0 + self.b1 * self.x1 + self.b2 * self.x2
                - self.a1 * self.y1
                - self.a2 * self.y2;
            self.x2 = self.x1;
            self.x1 = x0;
            self.y2 = self.y1;
            self.y1 = y0;
            *s = y0;
        }
    }
}

/// Apply the band-limiting filter to a waveform
///
/// The passband is realized as a high-pass section at `low_cut_hz` cascaded
/// with a low-pass section at `high_cut_hz` (two second-order sections,
/// order 4 overall). The output keeps the input's length and sample rate.
pub fn condition(
    waveform: &Waveform,
    low_cut_hz: f32,
    high_cut_hz: f32,
) -> Result<ConditionedSignal, ConditionError> {
    if waveform.is_empty() {
        return Err(ConditionError::EmptyWaveform);
    }

    let nyquist = waveform.sample_rate as f32 / 2.0;
    if low_cut_hz <= 0.0 || low_cut_hz >= high_cut_hz || high_cut_hz >= nyquist {
        return Err(ConditionError::InvalidBand {
            low: low_cut_hz,
            high: high_cut_hz,
            nyquist,
        });
    }

    let mut samples = waveform.to_mono();

    let sr = waveform.sample_rate as f32;
    Biquad::highpass(sr, low_cut_hz).process(&mut samples);
    Biquad::lowpass(sr, high_cut_hz).process(&mut samples);

    Ok(ConditionedSignal {
        samples,
        sample_rate: waveform.sample_rate,
    })
}

/// Compute the spectral summary of a conditioned signal
pub fn summarize(signal: &ConditionedSignal) -> Result<SpectralSummary, ConditionError> {
    if signal.samples.is_empty() {
        return Err(ConditionError::EmptyWaveform);
    }

    let n = signal.samples.len();
    let magnitudes = compute_fft(&signal.samples);

    // Positive-frequency half of the spectrum
    let half = &magnitudes[..(n / 2).max(1)];

    let mut peak_idx = 0;
    let mut peak_amplitude = half[0];
    for (i, &m) in half.iter().enumerate() {
        if m > peak_amplitude {
            peak_amplitude = m;
            peak_idx = i;
        }
    }

    let bin_width = signal.sample_rate as f32 / n as f32;
    let average_energy = half.iter().sum::<f32>() / half.len() as f32;

    Ok(SpectralSummary {
        peak_frequency: peak_idx as f32 * bin_width,
        peak_amplitude,
        average_energy,
        duration: n as f64 / signal.sample_rate as f64,
    })
}

/// Compute real FFT and return magnitude spectrum
fn compute_fft(samples: &[f32]) -> Vec<f32> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(samples.len());

    let mut input = samples.to_vec();
    let mut spectrum = fft.make_output_vec();

    fft.process(&mut input, &mut spectrum).unwrap();

    spectrum.iter().map(|c| c.norm()).collect()
}
