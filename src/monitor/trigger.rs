// Trigger sources
// The digital sound sensor is just a boolean read. Hardware goes through
// sysfs GPIO; tests script the line level or flip it from another thread.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A polled "sound present" line
pub trait TriggerSource: Send {
    fn read(&mut self) -> bool;
}

/// GPIO trigger read through the sysfs value file
pub struct SysfsGpioTrigger {
    value_path: PathBuf,
}

impl SysfsGpioTrigger {
    pub fn new(pin: u32) -> Self {
        SysfsGpioTrigger {
            value_path: PathBuf::from(format!("/sys/class/gpio/gpio{}/value", pin)),
        }
    }
}

impl TriggerSource for SysfsGpioTrigger {
    fn read(&mut self) -> bool {
        match fs::read_to_string(&self.value_path) {
            Ok(contents) => contents.trim() == "1",
            Err(e) => {
                log::debug!("GPIO read failed ({}): {}", self.value_path.display(), e);
                false
            }
        }
    }
}

/// Scripted trigger for tests: replays a fixed sequence of line levels,
/// then reads low forever
pub struct MockTrigger {
    script: Vec<bool>,
    position: usize,
}

impl MockTrigger {
    pub fn from_sequence(script: Vec<bool>) -> Self {
        MockTrigger {
            script,
            position: 0,
        }
    }
}

impl TriggerSource for MockTrigger {
    fn read(&mut self) -> bool {
        let level = self.script.get(self.position).copied().unwrap_or(false);
        self.position += 1;
        level
    }
}

/// Trigger backed by a shared flag another thread can flip
pub struct ManualTrigger {
    flag: Arc<AtomicBool>,
}

impl ManualTrigger {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        ManualTrigger { flag }
    }
}

impl TriggerSource for ManualTrigger {
    fn read(&mut self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_trigger_replays_script_then_reads_low() {
        let mut trigger = MockTrigger::from_sequence(vec![false, true, true]);
        assert!(!trigger.read());
        assert!(trigger.read());
        assert!(trigger.read());
        assert!(!trigger.read());
        assert!(!trigger.read());
    }

    #[test]
    fn test_manual_trigger_follows_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut trigger = ManualTrigger::new(flag.clone());
        assert!(!trigger.read());
        flag.store(true, Ordering::SeqCst);
        assert!(trigger.read());
    }

    #[test]
    fn test_sysfs_trigger_reads_low_on_missing_pin() {
        let mut trigger = SysfsGpioTrigger::new(999);
        assert!(!trigger.read());
    }
}
