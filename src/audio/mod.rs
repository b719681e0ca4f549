// Audio layer
// Capture devices, waveform representation, and signal conditioning

pub mod capture;
pub mod conditioner;
pub mod waveform;

pub use capture::{load_wav, CaptureDevice, CaptureError, CpalCapture, MockCapture};
pub use conditioner::{condition, summarize, ConditionError, ConditionedSignal, SpectralSummary};
pub use waveform::{Waveform, WaveformError};
