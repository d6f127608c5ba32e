//! Validation pipeline: raw file content to an all-or-nothing typed item list.

pub mod parser;
pub mod schema;

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use parser::{ContentParser, YamlParser};
pub use schema::{AcceptAll, JsonSchemaValidator, SchemaValidator};

use crate::error::{Result, SyncError};

/// Caller-supplied identity function. Must be pure and deterministic;
/// `None` marks the item as invalid.
pub type IdentityFn<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// The validated contents of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFile<T> {
    pub filename: String,
    /// `(identity, item)` pairs in file order.
    pub items: Vec<(String, T)>,
}

/// Parses, schema-checks and types the content of a single file.
///
/// Stateless: the same input always yields the same output.
pub struct ValidationPipeline<T> {
    parser: Box<dyn ContentParser>,
    schema: Box<dyn SchemaValidator>,
    identity: IdentityFn<T>,
}

impl<T> fmt::Debug for ValidationPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationPipeline").finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> ValidationPipeline<T> {
    /// Creates a pipeline from its three collaborators.
    pub fn new(
        parser: impl ContentParser + 'static,
        schema: impl SchemaValidator + 'static,
        identity: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            parser: Box::new(parser),
            schema: Box::new(schema),
            identity: Arc::new(identity),
        }
    }

    /// YAML documents checked against a JSON schema.
    pub fn yaml(
        schema: JsonSchemaValidator,
        identity: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self::new(YamlParser, schema, identity)
    }

    /// Validates the whole content of `filename`.
    ///
    /// Any failing item fails the file; the error carries every item's
    /// problems as details.
    pub fn validate(&self, filename: &str, content: &str) -> Result<ValidatedFile<T>> {
        let documents = self.parser.parse(filename, content)?;

        let mut details = Vec::new();
        let mut items = Vec::with_capacity(documents.len());

        for (index, document) in documents.into_iter().enumerate() {
            let errors = self.schema.validate(&document);
            if !errors.is_empty() {
                details.extend(errors.into_iter().map(|e| format!("item {}: {}", index, e)));
                continue;
            }

            match self.type_item(document) {
                Ok(item) => match (self.identity)(&item) {
                    Some(id) => items.push((id, item)),
                    None => details.push(format!("item {}: identity could not be derived", index)),
                },
                Err(e) => details.push(format!("item {}: {}", index, e)),
            }
        }

        if !details.is_empty() {
            return Err(SyncError::Validation {
                filename: filename.to_string(),
                details,
            });
        }

        Ok(ValidatedFile {
            filename: filename.to_string(),
            items,
        })
    }

    fn type_item(&self, document: Value) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Item {
        id: String,
        val: i64,
    }

    fn pipeline() -> ValidationPipeline<Item> {
        let schema = JsonSchemaValidator::new(&json!({
            "type": "object",
            "required": ["id", "val"],
            "properties": {
                "id": { "type": "string", "minLength": 1 },
                "val": { "type": "integer" }
            }
        }))
        .unwrap();
        ValidationPipeline::yaml(schema, |item: &Item| Some(item.id.clone()))
    }

    #[test]
    fn test_valid_file() {
        let file = pipeline()
            .validate("a.yaml", "id: x\nval: 1\n---\nid: y\nval: 2\n")
            .unwrap();
        assert_eq!(file.filename, "a.yaml");
        assert_eq!(
            file.items,
            vec![
                ("x".to_string(), Item { id: "x".to_string(), val: 1 }),
                ("y".to_string(), Item { id: "y".to_string(), val: 2 }),
            ]
        );
    }

    #[test]
    fn test_sequence_file_yields_one_item_per_element() {
        let file = pipeline()
            .validate("a.yaml", "- id: x\n  val: 1\n- id: y\n  val: 2\n")
            .unwrap();
        let ids: Vec<&str> = file.items.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[test]
    fn test_empty_file_is_valid() {
        let file = pipeline().validate("a.yaml", "").unwrap();
        assert!(file.items.is_empty());
    }

    #[test]
    fn test_one_bad_item_fails_whole_file() {
        let err = pipeline()
            .validate("a.yaml", "id: x\nval: 1\n---\nid: y\nval: nope\n")
            .unwrap_err();
        match err {
            SyncError::Validation { filename, details } => {
                assert_eq!(filename, "a.yaml");
                assert_eq!(details.len(), 1);
                assert!(details[0].starts_with("item 1:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_failure_is_validation_class() {
        let err = pipeline().validate("a.yaml", "id: [x\n").unwrap_err();
        assert_eq!(err.filename(), Some("a.yaml"));
    }

    #[test]
    fn test_missing_identity_fails_file() {
        let pipeline: ValidationPipeline<Value> =
            ValidationPipeline::new(YamlParser, AcceptAll, |v: &Value| {
                v.get("name").and_then(Value::as_str).map(str::to_string)
            });
        let err = pipeline.validate("a.yaml", "name: ok\n---\nother: 1\n").unwrap_err();
        assert_eq!(
            err.details(),
            vec!["item 1: identity could not be derived".to_string()]
        );
    }
}
