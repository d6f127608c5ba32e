//! Schema validation of individual items.

use std::path::Path;

use serde_json::Value;

use crate::error::{Result, SyncError};

/// Checks a single untyped item against a fixed schema.
pub trait SchemaValidator: Send + Sync {
    /// Returns every violation found; an empty list means the item is valid.
    fn validate(&self, item: &Value) -> Vec<String>;
}

/// JSON Schema backed validator.
pub struct JsonSchemaValidator {
    compiled: jsonschema::Validator,
}

impl JsonSchemaValidator {
    /// Compiles a schema document.
    pub fn new(schema: &Value) -> Result<Self> {
        let compiled = jsonschema::validator_for(schema)
            .map_err(|e| SyncError::InvalidSchema(format!("Failed to compile JSON schema: {}", e)))?;
        Ok(Self { compiled })
    }

    /// Loads and compiles a schema file. YAML is accepted as well as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let schema: Value = serde_yaml::from_str(&content).map_err(|e| {
            SyncError::InvalidSchema(format!("Invalid schema in '{}': {}", path.display(), e))
        })?;
        Self::new(&schema)
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, item: &Value) -> Vec<String> {
        self.compiled
            .iter_errors(item)
            .map(|e| e.to_string())
            .collect()
    }
}

/// Accepts every item.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
    fn validate(&self, _item: &Value) -> Vec<String> {
        Vec::new()
    }
}
