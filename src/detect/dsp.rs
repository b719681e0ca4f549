// DSP classifier
// Coarse energy-threshold gate over the band-limited spectrum. False
// positives are expected here; the fusion step absorbs them.

use crate::audio::conditioner::SpectralSummary;
use crate::detect::{Verdict, VerdictSource};

/// Decide whether the conditioned signal carries enough in-band energy
pub fn classify(summary: &SpectralSummary, energy_threshold: f32) -> Verdict {
    let is_positive = summary.average_energy > energy_threshold;

    log::debug!(
        "DSP verdict: energy {:.2} vs threshold {:.2} -> {}",
        summary.average_energy,
        energy_threshold,
        is_positive
    );

    Verdict {
        source: VerdictSource::Dsp,
        is_positive,
        confidence: None,
        threshold_used: energy_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(energy: f32) -> SpectralSummary {
        SpectralSummary {
            peak_frequency: 1200.0,
            peak_amplitude: energy * 4.0,
            average_energy: energy,
            duration: 3.0,
        }
    }

    #[test]
    fn test_energy_above_threshold_is_positive() {
        let verdict = classify(&summary(1500.0), 1000.0);
        assert!(verdict.is_positive);
        assert_eq!(verdict.source, VerdictSource::Dsp);
        assert_eq!(verdict.threshold_used, 1000.0);
        assert!(verdict.confidence.is_none());
    }

    #[test]
    fn test_energy_below_threshold_is_negative() {
        assert!(!classify(&summary(10.0), 1000.0).is_positive);
    }

    #[test]
    fn test_energy_equal_to_threshold_is_negative() {
        // Strict inequality: exactly at threshold does not fire
        assert!(!classify(&summary(1000.0), 1000.0).is_positive);
    }
}
