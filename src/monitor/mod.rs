// Event state machine
// Drives trigger -> capture -> analyze -> decide -> report. A lightweight
// poller thread watches the trigger line so short triggers are never missed
// while a cycle is busy; triggers observed mid-cycle are dropped, not queued.

pub mod trigger;

pub use trigger::{ManualTrigger, MockTrigger, SysfsGpioTrigger, TriggerSource};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use crate::audio::capture::{CaptureDevice, CaptureError};
use crate::audio::conditioner::{condition, summarize};
use crate::audio::waveform::WaveformError;
use crate::config::Config;
use crate::detect::fusion::{fuse, EventOutcome};
use crate::detect::ml::{verdict_from_score, InferenceEngine, InferenceError};
use crate::detect::{dsp, Verdict, VerdictSource};
use crate::features::tensor::{self, TensorConfig};
use crate::identity::DeviceIdentity;
use crate::report::ReportingGateway;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Capture produced no samples")]
    CaptureEmpty,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Failed to save recording: {0}")]
    Save(#[from] WaveformError),
}

/// Lifecycle of one trigger cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Capturing,
    Analyzing,
    Deciding,
    Reporting,
    Shutdown,
}

/// The subset of [`Config`] the state machine needs
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub recording_duration: Duration,
    pub recordings_dir: PathBuf,
    pub bandpass_low: f32,
    pub bandpass_high: f32,
    pub chainsaw_threshold: f32,
    pub ml_threshold: f32,
    pub tensor: TensorConfig,
}

impl From<&Config> for MonitorConfig {
    fn from(config: &Config) -> Self {
        MonitorConfig {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            recording_duration: Duration::from_secs(config.recording_duration),
            recordings_dir: config.recordings_dir.clone(),
            bandpass_low: config.bandpass_low,
            bandpass_high: config.bandpass_high,
            chainsaw_threshold: config.chainsaw_threshold,
            ml_threshold: config.ml_threshold,
            tensor: TensorConfig::default(),
        }
    }
}

/// Sensor-triggered detection pipeline
///
/// Owns the capture device and the optional inference engine; at most one
/// event cycle is in flight at a time.
pub struct Monitor {
    cfg: MonitorConfig,
    capture: Box<dyn CaptureDevice>,
    inference: Option<Box<dyn InferenceEngine>>,
    gateway: ReportingGateway,
    identity: DeviceIdentity,
    shutdown: Arc<AtomicBool>,
    state: MonitorState,
}

impl Monitor {
    pub fn new(
        cfg: MonitorConfig,
        capture: Box<dyn CaptureDevice>,
        inference: Option<Box<dyn InferenceEngine>>,
        gateway: ReportingGateway,
        identity: DeviceIdentity,
    ) -> Self {
        Monitor {
            cfg,
            capture,
            inference,
            gateway,
            identity,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: MonitorState::Idle,
        }
    }

    /// Flag checked at every suspension point; store `true` to stop cleanly
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Monitor the trigger source until shutdown
    pub fn run(&mut self, trigger: Box<dyn TriggerSource>) {
        let (events, poller) =
            spawn_poller(trigger, self.cfg.poll_interval, Arc::clone(&self.shutdown));

        log::info!(
            "Monitoring active (poll interval {:?}, ML {})",
            self.cfg.poll_interval,
            if self.inference.is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match events.recv_timeout(Duration::from_millis(100)) {
                Ok(()) => {
                    log::info!("Sound event detected");
                    match self.process_event() {
                        Ok(outcome) => log::info!(
                            "Cycle {} finished: confirmed={} reason={:?}",
                            outcome.id,
                            outcome.confirmed,
                            outcome.reason
                        ),
                        Err(e) => log::warn!("Cycle aborted: {}", e),
                    }
                    // Triggers that rose while this cycle was busy are dropped
                    while events.try_recv().is_ok() {}
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.state = MonitorState::Shutdown;
        poller.join().ok();
        log::info!("Monitor shut down");
    }

    /// Run one full trigger cycle; always ends back in `Idle`
    pub fn process_event(&mut self) -> Result<EventOutcome, CycleError> {
        let result = self.run_cycle();
        self.state = MonitorState::Idle;
        result
    }

    fn run_cycle(&mut self) -> Result<EventOutcome, CycleError> {
        self.state = MonitorState::Capturing;
        let waveform = self
            .capture
            .capture(self.cfg.recording_duration, &self.shutdown)?;
        if waveform.is_empty() {
            return Err(CycleError::CaptureEmpty);
        }
        let wav_path = waveform.save(&self.cfg.recordings_dir)?;

        self.state = MonitorState::Analyzing;
        let dsp_verdict = match condition(&waveform, self.cfg.bandpass_low, self.cfg.bandpass_high)
            .and_then(|conditioned| summarize(&conditioned))
        {
            Ok(summary) => {
                log::info!(
                    "Analysis: peak {:.1} Hz, energy {:.2}, duration {:.2}s",
                    summary.peak_frequency,
                    summary.average_energy,
                    summary.duration
                );
                dsp::classify(&summary, self.cfg.chainsaw_threshold)
            }
            Err(e) => {
                // No usable signal is no evidence of a chainsaw (fail-closed)
                log::warn!("Conditioning failed, treating as no signal: {}", e);
                Verdict {
                    source: VerdictSource::Dsp,
                    is_positive: false,
                    confidence: None,
                    threshold_used: self.cfg.chainsaw_threshold,
                }
            }
        };

        // ML only runs once the cheap DSP gate has fired
        let ml_result = match (&self.inference, dsp_verdict.is_positive) {
            (Some(engine), true) => Some(
                tensor::build(&waveform, &self.cfg.tensor)
                    .map_err(|e| InferenceError::Inference(e.to_string()))
                    .and_then(|tensor| engine.infer(&tensor))
                    .and_then(|score| verdict_from_score(score, self.cfg.ml_threshold)),
            ),
            _ => None,
        };
        drop(waveform);

        self.state = MonitorState::Deciding;
        let outcome = fuse(dsp_verdict, ml_result);

        self.state = MonitorState::Reporting;
        if outcome.confirmed {
            log::warn!("CHAINSAW DETECTED ({:?})", outcome.reason);
            if let Err(e) = self.gateway.report(&outcome, &self.identity, &wav_path) {
                // Failed reports are not retried within the cycle
                log::error!("Failed to send alert: {}", e);
            }
        } else {
            log::info!("No chainsaw pattern detected ({:?})", outcome.reason);
        }

        Ok(outcome)
    }
}

/// Watch the trigger line on a dedicated thread and emit one event per
/// rising edge. A continuously asserted line produces exactly one event;
/// the line must fall and rise again for the next one.
fn spawn_poller(
    mut trigger: Box<dyn TriggerSource>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> (Receiver<()>, JoinHandle<()>) {
    let (tx, rx) = sync_channel(1);

    let handle = thread::spawn(move || {
        let mut armed = false;
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }

            if trigger.read() {
                if !armed {
                    armed = true;
                    // Drop the edge if a cycle is already in flight
                    let _ = tx.try_send(());
                }
            } else {
                armed = false;
            }

            thread::sleep(interval);
        }
    });

    (rx, handle)
}
