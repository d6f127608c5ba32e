//! Error types for configuration synchronization.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, validating or watching configuration.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config directory not found: {0}")]
    ConfigDirNotFound(PathBuf),

    #[error("Failed to parse YAML in '{filename}': {message}")]
    ParseYaml { filename: String, message: String },

    #[error("Validation failed for '{filename}': {}", details.join("; "))]
    Validation {
        filename: String,
        details: Vec<String>,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Source '{source_name}' connectivity error: {message}")]
    SourceConnectivity {
        source_name: String,
        message: String,
    },

    #[error("Source '{source_name}' gave up after {attempts} attempts: {message}")]
    SourceExhausted {
        source_name: String,
        attempts: u32,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start runtime: {0}")]
    Runtime(String),

    #[error("Sync service has already been stopped")]
    AlreadyStopped,
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SyncError::ParseYaml {
            filename: String::new(),
            message: err.to_string(),
        }
    }
}

impl SyncError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::SourceConnectivity { .. }
                | SyncError::WatchError(_)
                | SyncError::ReadFile { .. }
        )
    }

    /// Returns the filename a validation-class error refers to, if any.
    pub fn filename(&self) -> Option<&str> {
        match self {
            SyncError::ParseYaml { filename, .. } | SyncError::Validation { filename, .. } => {
                Some(filename)
            }
            _ => None,
        }
    }

    /// Returns the per-item detail messages of a validation-class error.
    pub fn details(&self) -> Vec<String> {
        match self {
            SyncError::Validation { details, .. } => details.clone(),
            SyncError::ParseYaml { message, .. } => vec![message.clone()],
            other => vec![other.to_string()],
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
