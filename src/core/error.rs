//! Error types for the alerting engine.
//!
//! Only [`ConfigError`] is fatal. Fetch and summarizer failures are absorbed
//! by the scheduler and the delivery coordinator respectively.

use std::path::PathBuf;
use thiserror::Error;

use super::model::EntityClass;

/// Top-level error returned by the monitor surface.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Monitor is already running")]
    AlreadyRunning,
}

/// A read from the data store or the weather service failed.
///
/// Every variant is transient from the scheduler's point of view: the cycle
/// is skipped and the detector tries again on its next interval.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{source_name} unavailable: {message}")]
    Transient { source_name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    pub fn transient(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// One record in a fetched batch could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed {class:?} record at index {index}: {reason}")]
pub struct MalformedRecord {
    pub class: EntityClass,
    pub index: usize,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum SummarizerError {
    #[error("Summarizer failed: {0}")]
    Failed(String),

    #[error("Summarizer returned an empty summary")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
