// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::patch::StatePatch;
use super::schema::{Reducer, StateSchema};

/// Runtime workflow state with reducer support.
///
/// Serializes as the bare field map; reducers come from the graph's schema
/// and are re-attached with [`WorkflowState::with_schema`] after a load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    /// Current state values, key-ordered
    fields: Map<String, Value>,
    /// Reducers for each field
    #[serde(skip)]
    reducers: HashMap<String, Reducer>,
}

impl WorkflowState {
    /// Create a new WorkflowState seeded with a schema's defaults
    pub fn new(schema: &StateSchema) -> Self {
        Self::empty().with_schema(schema)
    }

    /// Create an empty WorkflowState
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach the reducers of a schema, filling in missing defaults
    pub fn with_schema(mut self, schema: &StateSchema) -> Self {
        for (name, value) in schema.defaults() {
            if !self.fields.contains_key(name) {
                self.fields.insert(name.to_string(), value.clone());
            }
        }
        self.reducers.extend(
            schema
                .fields
                .iter()
                .map(|(name, spec)| (name.clone(), spec.reducer)),
        );
        self
    }

    /// Write a top-level field through its reducer
    pub fn update(&mut self, key: &str, value: Value) {
        let reducer = self.reducers.get(key).copied().unwrap_or_default();
        if let Some(next) = reducer.combine(self.fields.get(key), value) {
            self.fields.insert(key.to_string(), next);
        }
    }

    /// Set a nested value by dotted path, creating intermediate objects.
    /// Non-object intermediates are replaced.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let mut parts = path.split('.');
        let Some(first) = parts.next() else {
            return;
        };
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            self.update(first, value);
            return;
        }

        let mut current = self
            .fields
            .entry(first.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for part in &rest[..rest.len() - 1] {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            current = match current {
                Value::Object(obj) => obj
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                _ => return,
            };
        }
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        if let (Value::Object(obj), Some(last)) = (current, rest.last()) {
            obj.insert(last.to_string(), value);
        }
    }

    /// Merge a patch: plain keys go through their reducer, dotted keys are
    /// set in place.
    pub fn apply(&mut self, patch: StatePatch) {
        for (key, value) in patch {
            if key.contains('.') {
                self.set_path(&key, value);
            } else {
                self.update(&key, value);
            }
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a nested field value using dot notation (e.g., "generation.sql")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    /// Nested string lookup
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Borrow the underlying field map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::workflow::state::schema::{FieldKind, FieldSpec};
    use serde_json::json;

    fn schema_of(fields: Vec<(&str, FieldKind, Reducer)>) -> StateSchema {
        fields
            .into_iter()
            .fold(StateSchema::default(), |schema, (name, kind, reducer)| {
                schema.declare(name, FieldSpec::new(kind).reduced_by(reducer))
            })
    }

    #[test]
    fn test_empty_state() {
        let state = WorkflowState::empty();
        assert!(state.get("anything").is_none());
    }

    #[test]
    fn test_state_with_defaults() {
        let schema = StateSchema::default().declare(
            "attempts",
            FieldSpec::new(FieldKind::Number).defaulting_to(json!(0)),
        );
        let state = WorkflowState::new(&schema);
        assert_eq!(state.get("attempts"), Some(&json!(0)));
    }

    #[test]
    fn test_append_reducer() {
        let schema = schema_of(vec![("notes", FieldKind::Array, Reducer::Append)]);
        let mut state = WorkflowState::new(&schema);

        state.update("notes", json!("first"));
        state.update("notes", json!(["second", "third"]));
        assert_eq!(state.get("notes"), Some(&json!(["first", "second", "third"])));
    }

    #[test]
    fn test_max_and_min_reducers() {
        let schema = schema_of(vec![
            ("peak", FieldKind::Number, Reducer::Max),
            ("floor", FieldKind::Number, Reducer::Min),
        ]);
        let mut state = WorkflowState::new(&schema);

        state.update("peak", json!(5.0));
        state.update("peak", json!(3.0));
        state.update("floor", json!(5.0));
        state.update("floor", json!(3.0));
        assert_eq!(state.get("peak"), Some(&json!(5.0)));
        assert_eq!(state.get("floor"), Some(&json!(3.0)));
    }

    #[test]
    fn test_merge_reducer() {
        let schema = schema_of(vec![("generation", FieldKind::Object, Reducer::Merge)]);
        let mut state = WorkflowState::new(&schema);

        state.update("generation", json!({"sql": "SELECT 1"}));
        state.update("generation", json!({"attempts": 1}));
        assert_eq!(
            state.get("generation"),
            Some(&json!({"sql": "SELECT 1", "attempts": 1}))
        );
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut state = WorkflowState::empty();
        state.set_path("generation.options.simple", json!(true));
        assert_eq!(state.get_path("generation.options.simple"), Some(&json!(true)));

        state.update("execution", json!("scalar"));
        state.set_path("execution.success", json!(false));
        assert_eq!(state.get("execution"), Some(&json!({"success": false})));
    }

    #[test]
    fn test_apply_mixes_plain_and_dotted_keys() {
        let mut state = WorkflowState::empty();
        let patch = StatePatch::new()
            .set("generation", json!({"sql": "SELECT *", "attempts": 1}))
            .set("generation.sql", json!("SELECT * LIMIT 10"));
        state.apply(patch);
        assert_eq!(state.get_str("generation.sql"), Some("SELECT * LIMIT 10"));
        assert_eq!(state.get_path("generation.attempts"), Some(&json!(1)));
    }

    #[test]
    fn test_get_path_indexes_arrays() {
        let mut state = WorkflowState::empty();
        state.update("rows", json!([{"n": 1}, {"n": 2}]));
        assert_eq!(state.get_path("rows.1.n"), Some(&json!(2)));
        assert_eq!(state.get_path("rows.9.n"), None);
    }

    #[test]
    fn test_serialization_roundtrip_keeps_exact_text() {
        let mut state = WorkflowState::empty();
        state.update("zeta", json!(1));
        state.update("alpha", json!({"nested": [1, 2, 3]}));
        let text = serde_json::to_string(&state).unwrap();
        let restored: WorkflowState = serde_json::from_str(&text).unwrap();
        assert_eq!(serde_json::to_string(&restored).unwrap(), text);
    }
}
