use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use super::schema::{SourceConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::source::kube::read_token;
use crate::source::{
    ConfigMapClient, FileSourceDriver, ManifestClient, ResourceSourceDriver, SourceDriver,
};
use crate::validation::{JsonSchemaValidator, ValidationPipeline};

/// Loads and validates a configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| SyncError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;

    // Relative paths are relative to the config file.
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<SyncConfig> {
    let config: SyncConfig =
        serde_yaml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

impl SyncConfig {
    /// Checks settings that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(SyncError::Config("at least one source is required".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(SyncError::Config(
                "channelCapacity must be greater than 0".to_string(),
            ));
        }
        if !self.identity_pointer.is_empty() && !self.identity_pointer.starts_with('/') {
            return Err(SyncError::Config(format!(
                "identityPointer '{}' must be empty or start with '/'",
                self.identity_pointer
            )));
        }
        if self.retry.base_delay_ms == 0 || self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(SyncError::Config(
                "retry delays must be positive and maxDelayMs >= baseDelayMs".to_string(),
            ));
        }

        let mut directories = HashSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            match source {
                SourceConfig::File {
                    directory,
                    debounce_ms,
                    extensions,
                } => {
                    if directory.as_os_str().is_empty() {
                        return Err(SyncError::Config(format!(
                            "sources[{}]: directory is required",
                            i
                        )));
                    }
                    if !directories.insert(directory.clone()) {
                        return Err(SyncError::Config(format!(
                            "sources[{}]: directory '{}' is watched twice",
                            i,
                            directory.display()
                        )));
                    }
                    if *debounce_ms == 0 {
                        return Err(SyncError::Config(format!(
                            "sources[{}]: debounceMs must be greater than 0",
                            i
                        )));
                    }
                    if extensions.is_empty() {
                        return Err(SyncError::Config(format!(
                            "sources[{}]: extensions must not be empty",
                            i
                        )));
                    }
                }
                SourceConfig::ConfigMap {
                    namespace,
                    name,
                    poll_interval_ms,
                    ..
                } => {
                    if namespace.is_empty() || name.is_empty() {
                        return Err(SyncError::Config(format!(
                            "sources[{}]: namespace and name are required",
                            i
                        )));
                    }
                    if *poll_interval_ms == 0 {
                        return Err(SyncError::Config(format!(
                            "sources[{}]: pollIntervalMs must be greater than 0",
                            i
                        )));
                    }
                }
                SourceConfig::Manifest {
                    path,
                    poll_interval_ms,
                } => {
                    if path.as_os_str().is_empty() {
                        return Err(SyncError::Config(format!("sources[{}]: path is required", i)));
                    }
                    if *poll_interval_ms == 0 {
                        return Err(SyncError::Config(format!(
                            "sources[{}]: pollIntervalMs must be greater than 0",
                            i
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Makes every relative path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.schema.is_relative() {
            self.schema = base.join(&self.schema);
        }
        for source in &mut self.sources {
            match source {
                SourceConfig::File { directory, .. } if directory.is_relative() => {
                    *directory = base.join(&*directory);
                }
                SourceConfig::Manifest { path, .. } if path.is_relative() => {
                    *path = base.join(&*path);
                }
                SourceConfig::ConfigMap {
                    token_file: Some(token_file),
                    ..
                } if token_file.is_relative() => {
                    *token_file = base.join(&*token_file);
                }
                _ => {}
            }
        }
    }

    /// Instantiates one driver per configured source.
    pub fn build_drivers(&self) -> Result<Vec<Box<dyn SourceDriver>>> {
        let retry = self.retry.policy();
        let mut drivers: Vec<Box<dyn SourceDriver>> = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let driver: Box<dyn SourceDriver> = match source {
                SourceConfig::File {
                    directory,
                    debounce_ms,
                    extensions,
                } => Box::new(
                    FileSourceDriver::new(directory)
                        .with_debounce(Duration::from_millis(*debounce_ms))
                        .with_extensions(extensions.clone())
                        .with_retry(retry),
                ),
                SourceConfig::ConfigMap {
                    api_server,
                    namespace,
                    name,
                    token_file,
                    poll_interval_ms,
                } => {
                    let client = match api_server {
                        Some(api_server) => {
                            let client = ConfigMapClient::new(api_server, namespace, name)?;
                            match token_file {
                                Some(token_file) => client.with_token(read_token(token_file)?),
                                None => client,
                            }
                        }
                        None => ConfigMapClient::in_cluster(namespace, name)?,
                    };
                    Box::new(
                        ResourceSourceDriver::new(client)
                            .with_poll_interval(Duration::from_millis(*poll_interval_ms))
                            .with_retry(retry),
                    )
                }
                SourceConfig::Manifest {
                    path,
                    poll_interval_ms,
                } => Box::new(
                    ResourceSourceDriver::new(ManifestClient::new(path))
                        .with_poll_interval(Duration::from_millis(*poll_interval_ms))
                        .with_retry(retry),
                ),
            };
            drivers.push(driver);
        }

        Ok(drivers)
    }

    /// Builds a YAML pipeline for untyped items keyed by `identityPointer`.
    pub fn build_pipeline(&self) -> Result<ValidationPipeline<Value>> {
        let schema = JsonSchemaValidator::from_file(&self.schema)?;
        Ok(ValidationPipeline::yaml(
            schema,
            identity_at(self.identity_pointer.clone()),
        ))
    }
}

/// Identity function reading a string or number at a JSON pointer.
pub fn identity_at(pointer: String) -> impl Fn(&Value) -> Option<String> + Send + Sync + 'static {
    move |item: &Value| match item.pointer(&pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
