// Device identity persistence
// The collector assigns an id/secret pair at registration; it is written
// once and read on every subsequent startup. Immutable for the process
// lifetime once loaded.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed identity file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Registered device credentials (camelCase on disk and on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_secret: String,
}

/// Load a persisted identity, if one exists
pub fn load(path: &Path) -> Result<Option<DeviceIdentity>, IdentityError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let identity: DeviceIdentity = serde_json::from_str(&contents)?;
    log::info!("Loaded device identity {}", identity.device_id);
    Ok(Some(identity))
}

/// Persist a freshly registered identity
pub fn store(identity: &DeviceIdentity, path: &Path) -> Result<(), IdentityError> {
    fs::write(path, serde_json::to_string(identity)?)?;
    log::info!("Device identity saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_identity.json");

        let identity = DeviceIdentity {
            device_id: "dev-42".to_string(),
            device_secret: "s3cret".to_string(),
        };

        store(&identity, &path).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded, identity);
    }

    #[test]
    fn test_missing_file_is_none() {
        assert!(load(Path::new("/nonexistent/identity.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_camel_case_keys_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_identity.json");

        let identity = DeviceIdentity {
            device_id: "dev-1".to_string(),
            device_secret: "x".to_string(),
        };
        store(&identity, &path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"deviceId\""));
        assert!(raw.contains("\"deviceSecret\""));
    }
}
