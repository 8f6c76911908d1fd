// SPDX-License-Identifier: MIT

//! Graph definition types
//!
//! The declarative shape of a step graph as written in YAML. Step names
//! are resolved against a `StepRegistry` when the definition is built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::warden::resilience::ErrorCategory;
use crate::warden::workflow::state::StateSchema;

/// A step graph definition
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct GraphDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Field types and reducers
    #[serde(default)]
    pub state: StateSchema,
    /// Node the cursor starts at
    pub entry: String,
    /// Node run once when a failure halts the thread
    pub error_node: Option<String>,
    /// State path holding the user's request text
    pub request_path: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    /// Outgoing edges are tried in the order written
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// A node binding a registered step
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeDefinition {
    pub id: String,
    /// Registry name; defaults to the node id
    pub step: Option<String>,
    /// Circuit breaker category; defaults to the node id
    pub category: Option<String>,
    /// Only these error categories are retried for this node
    pub retry_on: Option<Vec<ErrorCategory>>,
    /// capture key -> state path copied into failure contexts
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
}

impl NodeDefinition {
    pub fn step_name(&self) -> &str {
        self.step.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    /// Guard in the condition language; absent means always
    pub when: Option<String>,
}
