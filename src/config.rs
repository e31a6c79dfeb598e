//! Runtime configuration
//!
//! Every field has a default matching the behavior of the browser collector,
//! so an empty JSON object is a valid configuration.

use crate::error::CollectError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Collector endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://59gtln6uf4.execute-api.ap-south-1.amazonaws.com/prod";

/// Storage key of the pending delivery queue
pub const DEFAULT_STORAGE_KEY: &str = "suraksha_pending";

/// Minimum interval between recorded pointer samples (~40 Hz)
pub const DEFAULT_POINTER_SAMPLE_INTERVAL_MS: f64 = 25.0;

/// Pointer samples kept before the oldest is evicted
pub const DEFAULT_MAX_POINTER_SAMPLES: usize = 10_000;

pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 8_000;

/// Capture sampling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Pointer-move events closer than this to the last recorded sample are dropped
    pub pointer_sample_interval_ms: f64,
    /// Capacity of the pointer sample ring buffer
    pub max_pointer_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pointer_sample_interval_ms: DEFAULT_POINTER_SAMPLE_INTERVAL_MS,
            max_pointer_samples: DEFAULT_MAX_POINTER_SAMPLES,
        }
    }
}

/// Delivery queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Collector URL receiving one JSON payload per POST
    pub endpoint: String,
    /// Key under which the pending queue is persisted
    pub storage_key: String,
    /// Fixed delay before a follow-up attempt
    pub retry_delay_ms: u64,
    /// Upper bound on a single attempt, including the response
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl DeliveryConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, CollectError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, CollectError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, CollectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), CollectError> {
        let capture = &self.capture;
        if !(capture.pointer_sample_interval_ms.is_finite()
            && capture.pointer_sample_interval_ms > 0.0)
        {
            return Err(CollectError::ConfigError(
                "capture.pointer_sample_interval_ms must be a positive number".to_string(),
            ));
        }
        if capture.max_pointer_samples == 0 {
            return Err(CollectError::ConfigError(
                "capture.max_pointer_samples must be at least 1".to_string(),
            ));
        }

        let delivery = &self.delivery;
        if delivery.endpoint.trim().is_empty() {
            return Err(CollectError::ConfigError(
                "delivery.endpoint must not be empty".to_string(),
            ));
        }
        if delivery.storage_key.trim().is_empty() {
            return Err(CollectError::ConfigError(
                "delivery.storage_key must not be empty".to_string(),
            ));
        }
        if delivery.retry_delay_ms == 0 {
            return Err(CollectError::ConfigError(
                "delivery.retry_delay_ms must be positive".to_string(),
            ));
        }
        if delivery.request_timeout_ms == 0 || delivery.connect_timeout_ms == 0 {
            return Err(CollectError::ConfigError(
                "delivery timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
