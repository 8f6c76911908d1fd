// SPDX-License-Identifier: MIT

//! Partial state updates returned by steps and recovery strategies

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A complete partial update to a `WorkflowState`.
///
/// Keys are either top-level field names or dotted paths
/// (`generation.sql`) addressing a nested field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatePatch(Map<String, Value>);

impl StatePatch {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Overlay another patch; its keys win
    pub fn extend(&mut self, other: StatePatch) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl IntoIterator for StatePatch {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Map<String, Value>> for StatePatch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extend_overlays_keys() {
        let mut base = StatePatch::new().set("a", json!(1)).set("b", json!(2));
        base.extend(StatePatch::new().set("b", json!(3)));
        assert_eq!(base.get("a"), Some(&json!(1)));
        assert_eq!(base.get("b"), Some(&json!(3)));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let patch = StatePatch::new().set("generation.sql", json!("SELECT 1"));
        let text = serde_json::to_string(&patch).unwrap();
        assert_eq!(text, r#"{"generation.sql":"SELECT 1"}"#);
    }
}
