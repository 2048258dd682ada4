use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logger;
use crate::types::TimerReading;

/// Delays that shape a run. All values in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Wait between seeing the deadline and the first click.
    pub dwell_ms: u64,
    /// Wait between the buy click and the verify click.
    pub click_gap_ms: u64,
    /// Wait between monitoring cycles.
    pub poll_ms: u64,
    /// Re-check interval while paused.
    pub pause_poll_ms: u64,
    /// Random +/- ratio applied to `poll_ms`.
    pub poll_jitter: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            dwell_ms: 900,
            click_gap_ms: 180,
            poll_ms: 50,
            pause_poll_ms: 100,
            poll_jitter: 0.0,
        }
    }
}

impl Timing {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn click_gap(&self) -> Duration {
        Duration::from_millis(self.click_gap_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerSettings {
    /// ONNX text recognition model.
    pub model_path: PathBuf,
    /// Character dictionary of the model, one entry per line.
    pub dict_path: PathBuf,
    pub model_name: String,
    /// Longest a single recognition may take before the run fails.
    pub timeout_ms: u64,
    /// Recognitions below this score are reported but not parsed.
    pub min_confidence: f32,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/PP-OCRv5_mobile_rec.onnx"),
            dict_path: PathBuf::from("models/ppocrv5_dict.txt"),
            model_name: "PP-OCRv5_mobile_rec".into(),
            timeout_ms: 2000,
            min_confidence: 0.0,
        }
    }
}

impl RecognizerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub regions_file: PathBuf,
    pub display: u32,
    pub timing: Timing,
    pub deadline: TimerReading,
    pub confirm_readings: u32,
    pub recognizer: RecognizerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            regions_file: PathBuf::from("regions.json"),
            display: 0,
            timing: Timing::default(),
            deadline: TimerReading::new(0, 1),
            confirm_readings: 1,
            recognizer: RecognizerSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings, falling back to defaults when the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => {
                logger::info(&format!("no settings at {}, using defaults", path.display()));
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(s) => s,
            Err(e) => {
                logger::warn(&format!("ignoring malformed {}: {}", path.display(), e));
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            if let Err(e) = std::fs::write(path, json) {
                logger::warn(&format!("failed to write {}: {}", path.display(), e));
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        if t.click_gap_ms >= t.dwell_ms {
            return Err(ConfigError::Setting(format!(
                "click_gap_ms ({}) must be smaller than dwell_ms ({})",
                t.click_gap_ms, t.dwell_ms
            )));
        }
        if t.pause_poll_ms == 0 {
            return Err(ConfigError::Setting("pause_poll_ms must be positive".into()));
        }
        if !(0.0..1.0).contains(&t.poll_jitter) {
            return Err(ConfigError::Setting(format!(
                "poll_jitter ({}) must be in [0, 1)",
                t.poll_jitter
            )));
        }
        if self.confirm_readings == 0 {
            return Err(ConfigError::Setting("confirm_readings must be at least 1".into()));
        }
        if self.recognizer.timeout_ms == 0 {
            return Err(ConfigError::Setting("recognizer.timeout_ms must be positive".into()));
        }
        if self.deadline.seconds > 59 {
            return Err(ConfigError::Setting(format!(
                "deadline seconds ({}) out of range",
                self.deadline.seconds
            )));
        }
        Ok(())
    }
}
