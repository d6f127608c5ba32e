use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::source::RetryPolicy;

/// Top-level configuration of a sync process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// JSON Schema (JSON or YAML file) every item must satisfy.
    pub schema: PathBuf,

    /// JSON pointer to the identity field of each item.
    #[serde(default = "default_identity_pointer")]
    pub identity_pointer: String,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    pub sources: Vec<SourceConfig>,
}

/// Driver reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// One configuration source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceConfig {
    /// A directory tree of YAML files.
    #[serde(rename_all = "camelCase")]
    File {
        directory: PathBuf,
        #[serde(default = "default_debounce_ms")]
        debounce_ms: u64,
        #[serde(default = "default_extensions")]
        extensions: Vec<String>,
    },
    /// A ConfigMap read through the Kubernetes API.
    #[serde(rename_all = "camelCase")]
    ConfigMap {
        /// API server URL; omit to use the in-cluster service account.
        #[serde(default)]
        api_server: Option<String>,
        namespace: String,
        name: String,
        /// Bearer token file, used with an explicit `apiServer`.
        #[serde(default)]
        token_file: Option<PathBuf>,
        #[serde(default = "default_configmap_poll_ms")]
        poll_interval_ms: u64,
    },
    /// A ConfigMap manifest stored on local disk.
    #[serde(rename_all = "camelCase")]
    Manifest {
        path: PathBuf,
        #[serde(default = "default_manifest_poll_ms")]
        poll_interval_ms: u64,
    },
}

fn default_identity_pointer() -> String {
    "/metadata/name".to_string()
}

fn default_channel_capacity() -> usize {
    256
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string()]
}

fn default_configmap_poll_ms() -> u64 {
    5_000
}

fn default_manifest_poll_ms() -> u64 {
    2_000
}
