// Reporting gateway
// Serializes a confirmed event into the collector's alert payload and sends
// it over the ReportChannel seam. No retry here: a failed report surfaces to
// the caller and the cycle moves on.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::detect::fusion::EventOutcome;
use crate::identity::DeviceIdentity;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Audio recording unavailable at {0}")]
    AudioUnavailable(PathBuf),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Registration rejected: {0}")]
    Registration(String),
}

/// Alert body expected by the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub device_id: String,

    /// ISO-8601 UTC timestamp
    pub ts: String,

    pub lat: f64,
    pub lon: f64,

    /// Raw WAV bytes, base64-encoded
    pub audio_b64: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    device_id: Option<String>,
    device_secret: Option<String>,
}

/// Remote collector endpoints
pub trait ReportChannel: Send {
    fn register(&self, lat: f64, lon: f64) -> Result<DeviceIdentity, ReportError>;
    fn send(&self, payload: &AlertPayload) -> Result<(), ReportError>;
}

/// HTTP collector client
pub struct HttpReportChannel {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpReportChannel {
    pub fn new(base_url: &str) -> Result<Self, ReportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(HttpReportChannel {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ReportChannel for HttpReportChannel {
    fn register(&self, lat: f64, lon: f64) -> Result<DeviceIdentity, ReportError> {
        log::info!("Registering device at ({}, {})", lat, lon);

        let response: RegisterResponse = self
            .client
            .post(format!("{}/register", self.base_url))
            .json(&RegisterRequest { lat, lon })
            .send()?
            .error_for_status()?
            .json()?;

        match (response.device_id, response.device_secret) {
            (Some(device_id), Some(device_secret)) => Ok(DeviceIdentity {
                device_id,
                device_secret,
            }),
            _ => Err(ReportError::Registration(
                "response missing deviceId or deviceSecret".to_string(),
            )),
        }
    }

    fn send(&self, payload: &AlertPayload) -> Result<(), ReportError> {
        self.client
            .post(format!("{}/alert", self.base_url))
            .json(payload)
            .send()?
            .error_for_status()?;

        Ok(())
    }
}

/// Deterministic channel for tests and dry runs: records every payload
/// instead of contacting a collector, and can be switched to fail.
#[derive(Default)]
pub struct MockChannel {
    pub sent: Mutex<Vec<AlertPayload>>,
    pub fail_sends: bool,
}

impl ReportChannel for MockChannel {
    fn register(&self, _lat: f64, _lon: f64) -> Result<DeviceIdentity, ReportError> {
        Ok(DeviceIdentity {
            device_id: "mock-device".to_string(),
            device_secret: "mock-secret".to_string(),
        })
    }

    fn send(&self, payload: &AlertPayload) -> Result<(), ReportError> {
        if self.fail_sends {
            return Err(ReportError::Registration(
                "mock channel configured to fail".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

// Lets tests hand the gateway a channel they keep a handle to
impl ReportChannel for std::sync::Arc<MockChannel> {
    fn register(&self, lat: f64, lon: f64) -> Result<DeviceIdentity, ReportError> {
        self.as_ref().register(lat, lon)
    }

    fn send(&self, payload: &AlertPayload) -> Result<(), ReportError> {
        self.as_ref().send(payload)
    }
}

/// Builds and dispatches alert payloads for confirmed events
pub struct ReportingGateway {
    channel: Box<dyn ReportChannel>,
    latitude: f64,
    longitude: f64,
}

impl ReportingGateway {
    pub fn new(channel: Box<dyn ReportChannel>, latitude: f64, longitude: f64) -> Self {
        ReportingGateway {
            channel,
            latitude,
            longitude,
        }
    }

    /// Send one alert for a confirmed event
    ///
    /// The recording must still exist at `wav_path`; if it does not, the
    /// collector is never contacted.
    pub fn report(
        &self,
        outcome: &EventOutcome,
        identity: &DeviceIdentity,
        wav_path: &Path,
    ) -> Result<(), ReportError> {
        let audio =
            fs::read(wav_path).map_err(|_| ReportError::AudioUnavailable(wav_path.to_path_buf()))?;

        let payload = AlertPayload {
            device_id: identity.device_id.clone(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            lat: self.latitude,
            lon: self.longitude,
            audio_b64: BASE64.encode(&audio),
        };

        log::info!(
            "Sending alert for event {} ({} audio bytes)",
            outcome.id,
            audio.len()
        );
        self.channel.send(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::fusion::{fuse, DecisionReason};
    use crate::detect::{Verdict, VerdictSource};
    use std::sync::Arc;

    fn confirmed_outcome() -> EventOutcome {
        fuse(
            Verdict {
                source: VerdictSource::Dsp,
                is_positive: true,
                confidence: None,
                threshold_used: 1000.0,
            },
            None,
        )
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            device_id: "dev-7".to_string(),
            device_secret: "s".to_string(),
        }
    }

    #[test]
    fn test_report_sends_payload_with_encoded_audio() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("event.wav");
        fs::write(&wav_path, b"RIFFfake").unwrap();

        let channel = Arc::new(MockChannel::default());
        let gateway = ReportingGateway::new(Box::new(channel.clone()), 52.0, 21.0);

        let outcome = confirmed_outcome();
        assert_eq!(outcome.reason, DecisionReason::DspOnly);
        gateway.report(&outcome, &identity(), &wav_path).unwrap();

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].device_id, "dev-7");
        assert_eq!(sent[0].lat, 52.0);
        assert_eq!(BASE64.decode(&sent[0].audio_b64).unwrap(), b"RIFFfake");
        // Timestamp is collector-format ISO-8601 UTC
        assert!(
            chrono::NaiveDateTime::parse_from_str(&sent[0].ts, "%Y-%m-%dT%H:%M:%SZ").is_ok(),
            "bad timestamp {}",
            sent[0].ts
        );
    }

    #[test]
    fn test_missing_audio_never_contacts_channel() {
        let channel = Arc::new(MockChannel::default());
        let gateway = ReportingGateway::new(Box::new(channel.clone()), 52.0, 21.0);

        let err = gateway
            .report(
                &confirmed_outcome(),
                &identity(),
                Path::new("/nonexistent/event.wav"),
            )
            .unwrap_err();

        assert!(matches!(err, ReportError::AudioUnavailable(_)));
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_payload_wire_names_are_camel_case() {
        let payload = AlertPayload {
            device_id: "d".to_string(),
            ts: "2026-01-01T00:00:00Z".to_string(),
            lat: 1.0,
            lon: 2.0,
            audio_b64: "AAAA".to_string(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("deviceId"));
        assert!(obj.contains_key("audioB64"));
        assert!(obj.contains_key("ts"));
    }

    #[test]
    fn test_failed_send_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("event.wav");
        fs::write(&wav_path, b"RIFFfake").unwrap();

        let channel = MockChannel {
            fail_sends: true,
            ..Default::default()
        };
        let gateway = ReportingGateway::new(Box::new(channel), 52.0, 21.0);
        assert!(gateway
            .report(&confirmed_outcome(), &identity(), &wav_path)
            .is_err());
    }
}
