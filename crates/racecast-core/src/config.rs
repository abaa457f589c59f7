//! Pipeline configuration
//!
//! Loaded from a JSON file. Every field has a default, so a partial file
//! (or none at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::calibration::CalibrationConfig;
use crate::freshness::DEFAULT_MAX_MESSAGE_AGE_MS;
use crate::liveness::{DEFAULT_LIVENESS_TICK_MS, DEFAULT_LIVENESS_WINDOW_MS};
use crate::smoothing::DEFAULT_SMOOTHING_DURATION_MS;
use crate::transport::{TransportConfig, DEFAULT_RECONNECT_BACKOFF_MS};

/// Default frame period in milliseconds (~60 fps)
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// Errors loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for [`PipelineConfig`]
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    /// A setting is out of range
    #[error("Invalid setting '{field}': {message}")]
    Invalid {
        /// Name of the offending setting
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Everything the pipeline needs to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Broker connection settings
    pub transport: TransportConfig,

    /// Messages older than this are dropped
    pub max_message_age_ms: i64,

    /// Source counts as live if a message was accepted this recently
    pub liveness_window_ms: i64,

    /// Period of the liveness re-evaluation
    pub liveness_tick_ms: u64,

    /// Time for the display to reach a new target
    pub smoothing_duration_ms: u64,

    /// Delay before reconnecting after the session drops
    pub reconnect_backoff_ms: u64,

    /// Frame period while animating
    pub frame_interval_ms: u64,

    /// Per-metric value transforms
    pub calibration: CalibrationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            max_message_age_ms: DEFAULT_MAX_MESSAGE_AGE_MS,
            liveness_window_ms: DEFAULT_LIVENESS_WINDOW_MS,
            liveness_tick_ms: DEFAULT_LIVENESS_TICK_MS,
            smoothing_duration_ms: DEFAULT_SMOOTHING_DURATION_MS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            calibration: CalibrationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would stall or misconfigure the pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.host.trim().is_empty() {
            return Err(ConfigError::invalid("transport.host", "must not be empty"));
        }
        if self.transport.topic.trim().is_empty() {
            return Err(ConfigError::invalid("transport.topic", "must not be empty"));
        }
        if self.transport.port == 0 {
            return Err(ConfigError::invalid("transport.port", "must not be 0"));
        }
        if self.liveness_tick_ms == 0 {
            return Err(ConfigError::invalid("liveness_tick_ms", "must be positive"));
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::invalid("frame_interval_ms", "must be positive"));
        }
        if self.max_message_age_ms < 0 {
            return Err(ConfigError::invalid("max_message_age_ms", "must not be negative"));
        }
        if self.liveness_window_ms <= 0 {
            return Err(ConfigError::invalid("liveness_window_ms", "must be positive"));
        }

        let calibrations = [
            ("calibration.speed", &self.calibration.speed),
            ("calibration.rpm", &self.calibration.rpm),
            ("calibration.throttle", &self.calibration.throttle),
        ];
        for (field, calibration) in calibrations {
            calibration
                .validate()
                .map_err(|message| ConfigError::invalid(field, message))?;
        }
        Ok(())
    }

    /// Period of the liveness re-evaluation
    pub fn liveness_tick(&self) -> Duration {
        Duration::from_millis(self.liveness_tick_ms)
    }

    /// Period of the animation frame source
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Pause between failed connection attempts
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
