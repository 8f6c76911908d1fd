// SPDX-License-Identifier: MIT

//! Declared state fields and how repeated writes combine

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field declarations keyed by name, written inline under `state:` in a graph file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSchema {
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub reducer: Reducer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            reducer: Reducer::default(),
            default: None,
        }
    }

    pub fn reduced_by(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn defaulting_to(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    /// Whether a JSON value has this kind. `null` is accepted everywhere.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::Array, Value::Array(_)) => true,
            (FieldKind::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// How a write to a top-level field combines with what is already there
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    #[default]
    Overwrite,
    /// Push a scalar, extend with an array
    Append,
    /// Keep the larger number; non-numeric writes are dropped
    Max,
    /// Keep the smaller number; non-numeric writes are dropped
    Min,
    /// Shallow key merge of two objects
    Merge,
}

impl Reducer {
    /// The value the field should hold after `incoming` is written over
    /// `current`, or `None` when the write leaves the field as it is.
    pub fn combine(&self, current: Option<&Value>, incoming: Value) -> Option<Value> {
        match self {
            Reducer::Overwrite => Some(incoming),
            Reducer::Append => {
                let mut items = match current {
                    Some(Value::Array(existing)) => existing.clone(),
                    Some(Value::Null) | None => Vec::new(),
                    Some(scalar) => vec![scalar.clone()],
                };
                match incoming {
                    Value::Array(more) => items.extend(more),
                    one => items.push(one),
                }
                Some(Value::Array(items))
            }
            Reducer::Max | Reducer::Min => {
                let candidate = incoming.as_f64()?;
                let keep_candidate = match current.and_then(Value::as_f64) {
                    None => true,
                    Some(held) if *self == Reducer::Max => candidate > held,
                    Some(held) => candidate < held,
                };
                keep_candidate.then_some(incoming)
            }
            Reducer::Merge => match (current, incoming) {
                (Some(Value::Object(existing)), Value::Object(update)) => {
                    let mut merged = existing.clone();
                    merged.extend(update);
                    Some(Value::Object(merged))
                }
                (_, other) => Some(other),
            },
        }
    }
}

impl StateSchema {
    /// Declare a field; a repeated name replaces the earlier declaration
    pub fn declare(mut self, name: &str, spec: FieldSpec) -> Self {
        self.fields.insert(name.to_string(), spec);
        self
    }

    pub fn reducer_for(&self, name: &str) -> Reducer {
        self.fields
            .get(name)
            .map(|spec| spec.reducer)
            .unwrap_or_default()
    }

    /// Defaults paired with their field names, in name order
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .filter_map(|(name, spec)| spec.default.as_ref().map(|v| (name.as_str(), v)))
    }

    /// Reject declarations whose default does not match the declared kind
    pub fn validate(&self) -> Result<(), String> {
        for (name, spec) in &self.fields {
            if let Some(default) = &spec.default {
                if !spec.kind.accepts(default) {
                    return Err(format!(
                        "state field '{}' declares type {:?} but its default is {}",
                        name, spec.kind, default
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inline_yaml_fields() {
        let yaml = r#"
errors:
  type: array
  reducer: append
attempts:
  type: number
  default: 0
"#;
        let schema: StateSchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.reducer_for("errors"), Reducer::Append);
        assert_eq!(schema.reducer_for("attempts"), Reducer::Overwrite);
        assert_eq!(schema.reducer_for("undeclared"), Reducer::Overwrite);
        assert_eq!(
            schema.defaults().collect::<Vec<_>>(),
            vec![("attempts", &json!(0))]
        );
    }

    #[test]
    fn test_append_wraps_existing_scalar() {
        let combined = Reducer::Append.combine(Some(&json!("first")), json!(["second"]));
        assert_eq!(combined, Some(json!(["first", "second"])));
        assert_eq!(Reducer::Append.combine(None, json!(1)), Some(json!([1])));
    }

    #[test]
    fn test_max_min_ignore_non_numbers() {
        assert_eq!(Reducer::Max.combine(Some(&json!(3)), json!("high")), None);
        assert_eq!(Reducer::Max.combine(Some(&json!(3)), json!(2)), None);
        assert_eq!(Reducer::Min.combine(Some(&json!(3)), json!(2)), Some(json!(2)));
        assert_eq!(Reducer::Min.combine(None, json!(8)), Some(json!(8)));
    }

    #[test]
    fn test_merge_replaces_non_objects() {
        assert_eq!(
            Reducer::Merge.combine(Some(&json!({"a": 1})), json!({"b": 2})),
            Some(json!({"a": 1, "b": 2}))
        );
        assert_eq!(
            Reducer::Merge.combine(Some(&json!({"a": 1})), json!(7)),
            Some(json!(7))
        );
    }

    #[test]
    fn test_validate_rejects_mismatched_default() {
        let schema = StateSchema::default()
            .declare("attempts", FieldSpec::new(FieldKind::Number).defaulting_to(json!("zero")));
        let err = schema.validate().unwrap_err();
        assert!(err.contains("attempts"));

        let ok = StateSchema::default()
            .declare("notes", FieldSpec::new(FieldKind::Array).defaulting_to(json!(null)));
        assert!(ok.validate().is_ok());
    }
}
