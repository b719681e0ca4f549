// Detection layer
// Two independent classifiers (DSP energy gate, learned model) and the
// fusion policy that combines their verdicts

pub mod dsp;
pub mod fusion;
pub mod ml;

pub use dsp::classify;
pub use fusion::{fuse, DecisionReason, EventOutcome};
pub use ml::{verdict_from_score, InferenceEngine, InferenceError, TractModel};

/// Which classifier produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    Dsp,
    Ml,
}

/// One classifier's decision for one event
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub source: VerdictSource,
    pub is_positive: bool,

    /// Model score in [0,1]; None for the DSP classifier
    pub confidence: Option<f32>,

    pub threshold_used: f32,
}
