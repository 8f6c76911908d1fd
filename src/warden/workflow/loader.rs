// SPDX-License-Identifier: MIT

//! Graph loader - YAML file loading and parsing

use super::types::GraphDefinition;
use crate::base::error::WardenError;
use std::fs;
use std::path::Path;

/// Loads graph definitions from YAML files
pub struct GraphLoader;

impl GraphLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a graph definition from a YAML file
    pub fn load_graph<P: AsRef<Path>>(&self, path: P) -> Result<GraphDefinition, WardenError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a graph definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<GraphDefinition, WardenError> {
        let def: GraphDefinition = serde_yaml::from_str(content)?;
        def.state.validate().map_err(WardenError::config)?;
        Ok(def)
    }
}

impl Default for GraphLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::resilience::ErrorCategory;
    use crate::warden::workflow::state::Reducer;

    #[test]
    fn test_parse_minimal_graph() {
        let yaml = r#"
name: Minimal
entry: only
nodes:
  - id: only
"#;
        let def = GraphLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.name, "Minimal");
        assert_eq!(def.entry, "only");
        assert_eq!(def.nodes.len(), 1);
        assert_eq!(def.nodes[0].step_name(), "only");
        assert!(def.edges.is_empty());
        assert!(def.error_node.is_none());
    }

    #[test]
    fn test_parse_full_graph() {
        let yaml = r#"
name: Analysis
description: "Question to report"
entry: generate
error_node: handle_error
request_path: question.text
state:
  errors:
    type: array
    reducer: append
nodes:
  - id: generate
    step: generate_query
  - id: execute
    category: query_service
    retry_on: [quota, timeout]
    capture:
      sql: generation.sql
  - id: handle_error
edges:
  - from: generate
    to: execute
  - from: execute
    to: generate
    when: "execution.success == false"
  - from: execute
    to: END
"#;
        let def = GraphLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.error_node.as_deref(), Some("handle_error"));
        assert_eq!(def.request_path.as_deref(), Some("question.text"));
        assert_eq!(def.state.fields["errors"].reducer, Reducer::Append);

        let execute = &def.nodes[1];
        assert_eq!(def.nodes[0].step_name(), "generate_query");
        assert_eq!(execute.category.as_deref(), Some("query_service"));
        assert_eq!(
            execute.retry_on,
            Some(vec![ErrorCategory::Quota, ErrorCategory::Timeout])
        );
        assert_eq!(execute.capture["sql"], "generation.sql");

        assert_eq!(def.edges.len(), 3);
        assert_eq!(def.edges[1].when.as_deref(), Some("execution.success == false"));
        assert!(def.edges[2].when.is_none());
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let yaml = r#"
name: Bad
entry: a
nodes:
  - id: a
    retry_on: [sometimes]
"#;
        assert!(matches!(
            GraphLoader::parse_yaml(yaml),
            Err(WardenError::Yaml(_))
        ));
    }

    #[test]
    fn test_mistyped_state_default_is_config_error() {
        let yaml = r#"
name: Bad
entry: a
state:
  attempts:
    type: number
    default: "none yet"
nodes:
  - id: a
"#;
        assert!(matches!(
            GraphLoader::parse_yaml(yaml),
            Err(WardenError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = GraphLoader::new()
            .load_graph("/definitely/not/here.yaml")
            .unwrap_err();
        assert!(matches!(err, WardenError::Io(_)));
    }
}
