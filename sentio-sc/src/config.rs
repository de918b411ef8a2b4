//! Configuration for voice capture and prediction

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Voice pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Directory holding `scaler.json`, `model.json` and `labels.json`
    pub model_dir: PathBuf,

    /// Input device name (None = default device)
    pub device_name: Option<String>,

    /// Background voice worker
    pub worker: WorkerConfig,

    /// Request-driven prediction
    pub prediction: PredictionConfig,
}

/// Background voice worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Spawn the worker at startup
    pub enabled: bool,

    /// Capture rate for each chunk (Hz)
    pub sample_rate: u32,

    /// Chunk length in seconds
    pub chunk_secs: f32,

    /// First retry delay after a failed iteration
    pub backoff_initial_ms: u64,

    /// Retry delay ceiling
    pub backoff_max_ms: u64,

    /// Consecutive failures before the worker escalates to error-level logs
    pub failure_warn_threshold: u32,
}

/// Record / upload / raw-array prediction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Canonical rate: uploads are resampled to it, and record / raw-array
    /// requests default to it (Hz)
    pub sample_rate: u32,

    /// Record duration when the request does not name one
    pub default_duration_secs: f32,

    /// Longest record request accepted
    pub max_duration_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models/voice"),
            device_name: None,
            worker: WorkerConfig::default(),
            prediction: PredictionConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 16000,
            chunk_secs: 1.0,
            backoff_initial_ms: 100,
            backoff_max_ms: 5000,
            failure_warn_threshold: 10,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            default_duration_secs: 7.0,
            max_duration_secs: 30.0,
        }
    }
}

pub(crate) const MIN_SAMPLE_RATE: u32 = 8000;
pub(crate) const MAX_SAMPLE_RATE: u32 = 96000;

pub(crate) fn validate_sample_rate(rate: u32) -> Result<(), String> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
        return Err(format!(
            "Sample rate {} out of range ({}-{} Hz)",
            rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
        ));
    }
    Ok(())
}

impl AudioConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model_dir.as_os_str().is_empty() {
            return Err("Model directory cannot be empty".to_string());
        }

        if let Some(ref name) = self.device_name {
            if name.is_empty() || name.len() > 256 {
                return Err("Device name must be 1-256 characters".to_string());
            }
        }

        self.worker.validate()?;
        self.prediction.validate()?;

        Ok(())
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_sample_rate(self.sample_rate)?;

        if !(self.chunk_secs.is_finite() && self.chunk_secs > 0.0 && self.chunk_secs <= 30.0) {
            return Err("Worker chunk length must be in (0, 30] seconds".to_string());
        }

        if self.backoff_initial_ms == 0 {
            return Err("Backoff initial delay must be greater than 0".to_string());
        }

        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err("Backoff max delay must be >= initial delay".to_string());
        }

        if self.failure_warn_threshold == 0 {
            return Err("Failure threshold must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl PredictionConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_sample_rate(self.sample_rate)?;

        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err("Max duration must be positive".to_string());
        }

        if !(self.default_duration_secs.is_finite()
            && self.default_duration_secs > 0.0
            && self.default_duration_secs <= self.max_duration_secs)
        {
            return Err("Default duration must be in (0, max_duration_secs]".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AudioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker.sample_rate, 16000);
        assert_eq!(config.prediction.sample_rate, 22050);
        assert_eq!(config.prediction.default_duration_secs, 7.0);
    }

    #[test]
    fn test_rejects_bad_backoff() {
        let mut config = WorkerConfig::default();
        config.backoff_max_ms = 10;
        config.backoff_initial_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_default_above_max() {
        let mut config = PredictionConfig::default();
        config.default_duration_secs = 60.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AudioConfig =
            serde_json::from_str(r#"{"worker": {"enabled": false}}"#).unwrap();
        assert!(!config.worker.enabled);
        assert_eq!(config.worker.chunk_secs, 1.0);
        assert_eq!(config.prediction.max_duration_secs, 30.0);
    }
}
