// SPDX-License-Identifier: MIT

//! Nodes and guarded edges

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::base::error::ConditionError;
use crate::warden::resilience::ErrorCategory;
use crate::warden::workflow::condition::{self, Expression};
use crate::warden::workflow::state::{StatePatch, WorkflowState};
use crate::warden::workflow::step::Step;

/// Target id that ends the run
pub const END: &str = "END";

/// A step bound into a graph. Immutable once registered.
#[derive(Clone)]
pub struct Node {
    id: String,
    step: Arc<dyn Step>,
    category: String,
    retry_on: Option<Vec<ErrorCategory>>,
    /// capture key -> state path copied into failure contexts
    capture: BTreeMap<String, String>,
}

impl Node {
    /// The breaker category defaults to the node id
    pub fn new(id: impl Into<String>, step: Arc<dyn Step>) -> Self {
        let id = id.into();
        Self {
            category: id.clone(),
            id,
            step,
            retry_on: None,
            capture: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Only failures in these categories are retried for this node
    pub fn retry_on(mut self, categories: Vec<ErrorCategory>) -> Self {
        self.retry_on = Some(categories);
        self
    }

    pub fn capture(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.capture.insert(key.into(), path.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step(&self) -> &Arc<dyn Step> {
        &self.step
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn allows_retry(&self, category: ErrorCategory) -> bool {
        self.retry_on
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&category))
    }

    /// Values at the capture paths that are present in `state`
    pub fn captured(&self, state: &WorkflowState) -> Map<String, Value> {
        self.capture
            .iter()
            .filter_map(|(key, path)| state.get_path(path).map(|v| (key.clone(), v.clone())))
            .collect()
    }

    /// Rewrite a recovery patch keyed by capture keys onto state paths.
    /// Keys that are not capture keys pass through unchanged.
    pub fn map_recovery_patch(&self, patch: StatePatch) -> StatePatch {
        let mut mapped = StatePatch::new();
        for (key, value) in patch {
            let target = self.capture.get(&key).cloned().unwrap_or(key);
            mapped.insert(target, value);
        }
        mapped
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("step", &self.step.name())
            .field("category", &self.category)
            .field("retry_on", &self.retry_on)
            .field("capture", &self.capture)
            .finish()
    }
}

pub type Predicate = Arc<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// A pure test over the merged state
#[derive(Clone)]
pub enum EdgeGuard {
    Condition { source: String, expr: Expression },
    Predicate(Predicate),
}

impl EdgeGuard {
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        Ok(EdgeGuard::Condition {
            source: source.to_string(),
            expr: condition::parse(source)?,
        })
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    {
        EdgeGuard::Predicate(Arc::new(f))
    }

    pub fn matches(&self, state: &WorkflowState) -> bool {
        match self {
            EdgeGuard::Condition { expr, .. } => condition::evaluate(expr, state),
            EdgeGuard::Predicate(f) => f(state),
        }
    }
}

impl fmt::Debug for EdgeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeGuard::Condition { source, .. } => write!(f, "when({})", source),
            EdgeGuard::Predicate(_) => f.write_str("predicate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// `None` always matches
    pub guard: Option<EdgeGuard>,
}

impl Edge {
    pub fn matches(&self, state: &WorkflowState) -> bool {
        self.guard.as_ref().map_or(true, |g| g.matches(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::workflow::step::{StepError, StepOutcome};
    use async_trait::async_trait;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl Step for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn run(&self, _state: &WorkflowState) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Update(StatePatch::new()))
        }
    }

    #[test]
    fn test_node_defaults() {
        let node = Node::new("execute_query", Arc::new(Noop));
        assert_eq!(node.category(), "execute_query");
        assert!(node.allows_retry(ErrorCategory::Timeout));
    }

    #[test]
    fn test_retry_allowlist() {
        let node = Node::new("n", Arc::new(Noop)).retry_on(vec![ErrorCategory::Quota]);
        assert!(node.allows_retry(ErrorCategory::Quota));
        assert!(!node.allows_retry(ErrorCategory::Timeout));
    }

    #[test]
    fn test_capture_and_patch_mapping() {
        let node = Node::new("n", Arc::new(Noop))
            .capture("sql", "generation.sql")
            .capture("missing", "nowhere.at.all");
        let mut state = WorkflowState::empty();
        state.update("generation", json!({"sql": "SELECT 1"}));

        let captured = node.captured(&state);
        assert_eq!(captured.get("sql"), Some(&json!("SELECT 1")));
        assert!(!captured.contains_key("missing"));

        let mapped = node.map_recovery_patch(
            StatePatch::new()
                .set("sql", json!("SELECT 1 LIMIT 10"))
                .set("retry_generation", json!(true)),
        );
        assert_eq!(mapped.get("generation.sql"), Some(&json!("SELECT 1 LIMIT 10")));
        assert_eq!(mapped.get("retry_generation"), Some(&json!(true)));
    }

    #[test]
    fn test_edge_guards() {
        let mut state = WorkflowState::empty();
        state.update("score", json!(7));

        let always = Edge {
            from: "a".to_string(),
            to: "b".to_string(),
            guard: None,
        };
        let cond = Edge {
            guard: Some(EdgeGuard::parse("score > 5").unwrap()),
            ..always.clone()
        };
        let pred = Edge {
            guard: Some(EdgeGuard::predicate(|s| s.get("score") == Some(&json!(8)))),
            ..always.clone()
        };
        assert!(always.matches(&state));
        assert!(cond.matches(&state));
        assert!(!pred.matches(&state));
    }
}
