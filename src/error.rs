//! Error types for Suraksha

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the public, fallible APIs of the crate
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid input event: {0}")]
    InvalidEvent(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Failures of the durable key/value store backing the pending queue
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Quota exceeded: {needed} bytes needed, {quota} bytes available")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// Transient failures of a single delivery attempt
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Collector responded with status {0}")]
    Status(u16),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}
