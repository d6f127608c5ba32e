//! Structured-text parsing of raw file content into untyped documents.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SyncError};

/// Turns raw file content into an ordered sequence of untyped items.
pub trait ContentParser: Send + Sync {
    /// Parses `content`. Empty or whitespace-only content yields no items.
    fn parse(&self, filename: &str, content: &str) -> Result<Vec<Value>>;
}

/// Multi-document YAML parser.
///
/// Every `---` separated document is one item, except that a document whose
/// top level is a sequence contributes each of its elements as an item.
/// Empty documents are skipped, so a file holding only comments or
/// separators yields no items.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParser;

impl ContentParser for YamlParser {
    fn parse(&self, filename: &str, content: &str) -> Result<Vec<Value>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        for document in serde_yaml::Deserializer::from_str(content) {
            let value = Value::deserialize(document).map_err(|e| SyncError::ParseYaml {
                filename: filename.to_string(),
                message: e.to_string(),
            })?;
            match value {
                Value::Null => {}
                Value::Array(elements) => {
                    items.extend(elements.into_iter().filter(|e| !e.is_null()));
                }
                other => items.push(other),
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content() {
        assert!(YamlParser.parse("a.yaml", "").unwrap().is_empty());
        assert!(YamlParser.parse("a.yaml", "   \n\t\n").unwrap().is_empty());
    }

    #[test]
    fn test_comment_only_content() {
        let items = YamlParser.parse("a.yaml", "# nothing here\n---\n").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_multiple_documents_keep_order() {
        let yaml = r#"
id: x
val: 1
---
id: y
val: 2
---
id: z
val: 3
"#;
        let items = YamlParser.parse("a.yaml", yaml).unwrap();
        let ids: Vec<&str> = items.iter().filter_map(|v| v["id"].as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
        assert_eq!(items[1]["val"], 2);
    }

    #[test]
    fn test_top_level_sequence_is_flattened() {
        let yaml = "- id: x\n  val: 1\n- id: y\n  val: 2\n---\nid: z\nval: 3\n";
        let items = YamlParser.parse("a.yaml", yaml).unwrap();
        let ids: Vec<&str> = items.iter().filter_map(|v| v["id"].as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_flow_sequence_document() {
        let items = YamlParser
            .parse("a.yaml", "[{id: x, val: 1}]\n")
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["val"], 1);
    }

    #[test]
    fn test_invalid_yaml_reports_filename() {
        let err = YamlParser
            .parse("broken.yaml", "id: [unclosed\n")
            .unwrap_err();
        assert_eq!(err.filename(), Some("broken.yaml"));
        assert!(matches!(err, SyncError::ParseYaml { .. }));
    }
}
