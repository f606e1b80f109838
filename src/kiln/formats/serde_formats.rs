//! Formats backed by the serde form of the tree

use super::registry::{FormatError, Formatter};
use crate::kiln::runtime::ParseTree;

/// Pretty-printed JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn name(&self) -> &str {
        "json"
    }

    fn serialize(&self, tree: &ParseTree) -> Result<String, FormatError> {
        serde_json::to_string_pretty(tree)
            .map_err(|e| FormatError::SerializationError(e.to_string()))
    }

    fn description(&self) -> &str {
        "Tree as pretty-printed JSON"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFormatter;

impl Formatter for YamlFormatter {
    fn name(&self) -> &str {
        "yaml"
    }

    fn serialize(&self, tree: &ParseTree) -> Result<String, FormatError> {
        serde_yaml::to_string(tree).map_err(|e| FormatError::SerializationError(e.to_string()))
    }

    fn description(&self) -> &str {
        "Tree as YAML"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::runtime::tree::tests::sample;

    #[test]
    fn test_json_shape() {
        let text = JsonFormatter.serialize(&sample()).expect("serializes");
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value["node"], "rule");
        assert_eq!(value["rule"], "expr");
        assert_eq!(value["alternative"], 1);
        assert_eq!(value["children"][0]["node"], "terminal");
        assert_eq!(value["children"][2]["token"]["text"], "100");
        assert!(value.get("label").is_none());
    }

    #[test]
    fn test_yaml_shape() {
        let text = YamlFormatter.serialize(&sample()).expect("serializes");
        let value: serde_yaml::Value = serde_yaml::from_str(&text).expect("valid yaml");
        assert_eq!(value["rule"].as_str(), Some("expr"));
        assert_eq!(value["children"][1]["symbol"].as_str(), Some("PLUS"));
    }
}
