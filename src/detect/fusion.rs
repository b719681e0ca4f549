// Fusion decision engine
// Combines the always-available DSP verdict with the optional ML verdict.
// The DSP gate is fail-closed (no energy means no event); ML failure is
// fail-open (a broken model must not suppress a real alert).

use uuid::Uuid;

use crate::detect::ml::InferenceError;
use crate::detect::Verdict;

/// Why an event was confirmed or rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// DSP gate did not fire
    NoSignal,

    /// DSP fired and no model is configured
    DspOnly,

    /// DSP fired, model configured but inference failed; DSP verdict stands
    MlFailedFallbackDsp,

    /// Both classifiers fired
    DspAndMlAgree,

    /// DSP fired but the model rejected the event
    MlRejected,
}

/// Terminal record of one trigger cycle
#[derive(Debug, Clone)]
pub struct EventOutcome {
    /// Cycle id, used to correlate log lines and the outbound report
    pub id: Uuid,
    pub dsp: Verdict,
    pub ml: Option<Verdict>,
    pub confirmed: bool,
    pub reason: DecisionReason,
}

/// Combine the two classifier verdicts into one outcome
///
/// `ml` is `None` when no model is configured, `Some(Err(_))` when inference
/// was attempted and failed, and `Some(Ok(_))` when it produced a verdict.
pub fn fuse(dsp: Verdict, ml: Option<Result<Verdict, InferenceError>>) -> EventOutcome {
    let (ml_verdict, ml_failed) = match ml {
        None => (None, false),
        Some(Ok(verdict)) => (Some(verdict), false),
        Some(Err(e)) => {
            log::warn!("ML inference failed, falling back to DSP verdict: {}", e);
            (None, true)
        }
    };

    let (confirmed, reason) = if !dsp.is_positive {
        (false, DecisionReason::NoSignal)
    } else {
        match (&ml_verdict, ml_failed) {
            (None, false) => (true, DecisionReason::DspOnly),
            (None, true) => (true, DecisionReason::MlFailedFallbackDsp),
            (Some(v), _) if v.is_positive => (true, DecisionReason::DspAndMlAgree),
            (Some(_), _) => (false, DecisionReason::MlRejected),
        }
    };

    EventOutcome {
        id: Uuid::new_v4(),
        dsp,
        ml: ml_verdict,
        confirmed,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ml::verdict_from_score;
    use crate::detect::VerdictSource;

    fn dsp_verdict(positive: bool) -> Verdict {
        Verdict {
            source: VerdictSource::Dsp,
            is_positive: positive,
            confidence: None,
            threshold_used: 1000.0,
        }
    }

    #[test]
    fn test_dsp_negative_rejects_regardless_of_ml() {
        let outcome = fuse(dsp_verdict(false), None);
        assert!(!outcome.confirmed);
        assert_eq!(outcome.reason, DecisionReason::NoSignal);
    }

    #[test]
    fn test_dsp_positive_without_model_confirms() {
        let outcome = fuse(dsp_verdict(true), None);
        assert!(outcome.confirmed);
        assert_eq!(outcome.reason, DecisionReason::DspOnly);
        assert!(outcome.ml.is_none());
    }

    #[test]
    fn test_ml_failure_falls_back_to_dsp() {
        let outcome = fuse(
            dsp_verdict(true),
            Some(Err(InferenceError::Inference("boom".to_string()))),
        );
        assert!(outcome.confirmed);
        assert_eq!(outcome.reason, DecisionReason::MlFailedFallbackDsp);
    }

    #[test]
    fn test_both_positive_confirms() {
        let ml = verdict_from_score(0.9, 0.5);
        let outcome = fuse(dsp_verdict(true), Some(ml));
        assert!(outcome.confirmed);
        assert_eq!(outcome.reason, DecisionReason::DspAndMlAgree);
        assert_eq!(outcome.ml.unwrap().confidence, Some(0.9));
    }

    #[test]
    fn test_ml_rejection_overrides_dsp() {
        let ml = verdict_from_score(0.1, 0.5);
        let outcome = fuse(dsp_verdict(true), Some(ml));
        assert!(!outcome.confirmed);
        assert_eq!(outcome.reason, DecisionReason::MlRejected);
    }

    #[test]
    fn test_invalid_score_takes_fallback_path() {
        let ml = verdict_from_score(1.5, 0.5);
        let outcome = fuse(dsp_verdict(true), Some(ml));
        assert!(outcome.confirmed);
        assert_eq!(outcome.reason, DecisionReason::MlFailedFallbackDsp);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let a = fuse(dsp_verdict(true), Some(verdict_from_score(0.8, 0.5)));
        let b = fuse(dsp_verdict(true), Some(verdict_from_score(0.8, 0.5)));
        assert_eq!(a.confirmed, b.confirmed);
        assert_eq!(a.reason, b.reason);
        assert_eq!(a.dsp, b.dsp);
        assert_eq!(a.ml, b.ml);
    }
}
