// Sylva - edge acoustic chainsaw detection
// Module declarations

pub mod audio;
pub mod config;
pub mod detect;
pub mod features;
pub mod identity;
pub mod monitor;
pub mod report;

pub use audio::{CaptureDevice, CpalCapture, MockCapture, Waveform};
pub use config::Config;
pub use detect::{fuse, DecisionReason, EventOutcome, InferenceEngine, TractModel, Verdict};
pub use identity::DeviceIdentity;
pub use monitor::{Monitor, MonitorConfig, MonitorState, TriggerSource};
pub use report::{HttpReportChannel, ReportChannel, ReportingGateway};
