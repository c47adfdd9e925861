//! Recording configuration.
//!
//! `frames_before_write` sets the flush cadence: the frame buffer holds that
//! many frames before they are appended to the store. At 90 Hz the default of
//! 200 flushes roughly every two seconds.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::log_error::{LogError, LogResult};

/// Default number of frames buffered between flushes.
pub const DEFAULT_FRAMES_BEFORE_WRITE: usize = 200;

/// Settings for a recording session.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Frames buffered in memory before a durable block append.
    pub frames_before_write: usize,
    /// Record wall-clock duration of each flush in the checkpoint.
    pub profiling_mode: bool,
    /// Value carried forward on frame 0 for actions that were never written.
    pub initial_fill: f32,
    /// `sync_data` table files before publishing a checkpoint.
    pub sync_on_flush: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            frames_before_write: DEFAULT_FRAMES_BEFORE_WRITE,
            profiling_mode: false,
            initial_fill: 0.0,
            sync_on_flush: true,
        }
    }
}

impl LogConfig {
    /// Config with the given flush cadence and defaults elsewhere.
    pub fn with_frames_before_write(frames_before_write: usize) -> Self {
        Self {
            frames_before_write,
            ..Self::default()
        }
    }

    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> LogResult<()> {
        if self.frames_before_write == 0 {
            return Err(LogError::InvalidConfig(
                "frames_before_write must be at least 1".to_string(),
            ));
        }
        if !self.initial_fill.is_finite() {
            return Err(LogError::InvalidConfig(format!(
                "initial_fill must be finite, got {}",
                self.initial_fill
            )));
        }
        Ok(())
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> LogResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LogError::InvalidConfig(format!("JSON decode error: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = LogConfig::default();
        assert_eq!(config.frames_before_write, 200);
        assert!(!config.profiling_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_cadence_rejected() {
        let err = LogConfig::with_frames_before_write(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, LogError::InvalidConfig(_)));
    }

    #[test]
    fn non_finite_fill_rejected() {
        let config = LogConfig {
            initial_fill: f32::NAN,
            ..LogConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_roundtrip() {
        let config = LogConfig {
            frames_before_write: 32,
            profiling_mode: true,
            initial_fill: -1.0,
            sync_on_flush: false,
        };
        let decoded = LogConfig::from_json(&config.to_json()).expect("decode should succeed");
        assert_eq!(config, decoded);
    }

    #[test]
    fn json_missing_fields_use_defaults() {
        let config = LogConfig::from_json(r#"{ "profiling_mode": true }"#).unwrap();
        assert!(config.profiling_mode);
        assert_eq!(config.frames_before_write, DEFAULT_FRAMES_BEFORE_WRITE);
    }

    #[test]
    fn json_invalid_values_rejected() {
        let err = LogConfig::from_json(r#"{ "frames_before_write": 0 }"#).unwrap_err();
        assert!(matches!(err, LogError::InvalidConfig(_)));
    }
}
