// Learned-model classifier
// Wraps an ONNX model behind the InferenceEngine seam so the monitor can be
// tested without a model on disk. Absence of a model is a normal operating
// mode (DSP-only), not an error.

use std::path::Path;

use thiserror::Error;
use tract_onnx::prelude::*;

use crate::detect::{Verdict, VerdictSource};
use crate::features::tensor::FeatureTensor;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model returned score {0} outside [0,1]")]
    InvalidScore(f32),
}

/// Scores a feature tensor; the score is expected in [0,1]
pub trait InferenceEngine: Send {
    fn infer(&self, tensor: &FeatureTensor) -> Result<f32, InferenceError>;
}

/// ONNX model executed through tract
#[derive(Debug)]
pub struct TractModel {
    model: TypedRunnableModel<TypedModel>,
}

impl TractModel {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        log::info!("Loaded inference model from {}", path.display());
        Ok(TractModel { model })
    }
}

impl InferenceEngine for TractModel {
    fn infer(&self, tensor: &FeatureTensor) -> Result<f32, InferenceError> {
        let input = Tensor::from_shape(&tensor.shape(), tensor.values())
            .map_err(|e| InferenceError::Inference(e.to_string()))?;

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Inference(e.to_string()))?;

        let scores = outputs[0]
            .as_slice::<f32>()
            .map_err(|e| InferenceError::Inference(e.to_string()))?;

        scores
            .first()
            .copied()
            .ok_or_else(|| InferenceError::Inference("model produced no output".to_string()))
    }
}

/// Turn a raw model score into an ML verdict
///
/// Scores outside [0,1] violate the model contract and are rejected; the
/// caller treats that as an inference failure (fall back to the DSP verdict).
pub fn verdict_from_score(score: f32, ml_threshold: f32) -> Result<Verdict, InferenceError> {
    if !(0.0..=1.0).contains(&score) || score.is_nan() {
        return Err(InferenceError::InvalidScore(score));
    }

    Ok(Verdict {
        source: VerdictSource::Ml,
        is_positive: score > ml_threshold,
        confidence: Some(score),
        threshold_used: ml_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_above_threshold() {
        let verdict = verdict_from_score(0.9, 0.5).unwrap();
        assert!(verdict.is_positive);
        assert_eq!(verdict.confidence, Some(0.9));
        assert_eq!(verdict.source, VerdictSource::Ml);
    }

    #[test]
    fn test_score_below_threshold() {
        let verdict = verdict_from_score(0.1, 0.5).unwrap();
        assert!(!verdict.is_positive);
    }

    #[test]
    fn test_score_at_threshold_is_negative() {
        assert!(!verdict_from_score(0.5, 0.5).unwrap().is_positive);
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        assert!(matches!(
            verdict_from_score(1.2, 0.5),
            Err(InferenceError::InvalidScore(_))
        ));
        assert!(matches!(
            verdict_from_score(-0.1, 0.5),
            Err(InferenceError::InvalidScore(_))
        ));
        assert!(matches!(
            verdict_from_score(f32::NAN, 0.5),
            Err(InferenceError::InvalidScore(_))
        ));
    }

    #[test]
    fn test_missing_model_file_fails_to_load() {
        let err = TractModel::load(Path::new("/nonexistent/model.onnx")).unwrap_err();
        assert!(matches!(err, InferenceError::ModelLoad(_)));
    }
}
