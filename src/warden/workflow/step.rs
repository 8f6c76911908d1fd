// SPDX-License-Identifier: MIT

//! The unit of work a graph node runs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::warden::resilience::ErrorCategory;
use crate::warden::workflow::state::{StatePatch, WorkflowState};

/// A step reads the current state and hands back a complete partial update.
///
/// Steps never mutate state directly; the executor merges the returned
/// patch only after the step has finished.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError>;
}

/// What a step asks the executor to do next
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Merge the patch and follow the outgoing edges
    Update(StatePatch),
    /// Merge the patch, checkpoint, and wait for an external decision
    Suspend(SuspendRequest),
}

impl StepOutcome {
    pub fn update(patch: StatePatch) -> Self {
        StepOutcome::Update(patch)
    }
}

/// One choice offered to the reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOption {
    pub id: String,
    pub label: String,
}

impl ReviewOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Payload handed to the caller while the workflow waits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionPayload {
    pub task: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub options: Vec<ReviewOption>,
}

impl SuspensionPayload {
    /// Whether `decision` names one of the offered options
    pub fn offers(&self, decision: &str) -> bool {
        self.options.iter().any(|o| o.id == decision)
    }

    /// The option an unrecognized decision falls back to
    pub fn default_option(&self) -> Option<&ReviewOption> {
        self.options.first()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuspendRequest {
    pub payload: SuspensionPayload,
    /// Merged into state before the checkpoint is written
    pub patch: StatePatch,
}

impl SuspendRequest {
    pub fn new(task: impl Into<String>, options: Vec<ReviewOption>) -> Self {
        Self {
            payload: SuspensionPayload {
                task: task.into(),
                context: Map::new(),
                options,
            },
            patch: StatePatch::new(),
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.payload.context = context;
        self
    }

    pub fn with_patch(mut self, patch: StatePatch) -> Self {
        self.patch = patch;
        self
    }
}

/// A failure raised by a step.
///
/// Steps that already know what went wrong can set `category`; otherwise the
/// executor classifies the message.
#[derive(Debug, Clone, PartialEq)]
pub struct StepError {
    pub message: String,
    pub category: Option<ErrorCategory>,
    pub context: Map<String, Value>,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: None,
            context: Map::new(),
        }
    }

    pub fn categorized(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category: Some(category),
            ..Self::new(message)
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_offers_and_default() {
        let request = SuspendRequest::new(
            "Review the analysis",
            vec![
                ReviewOption::new("approve", "Approve"),
                ReviewOption::new("modify", "Modify"),
            ],
        );
        assert!(request.payload.offers("modify"));
        assert!(!request.payload.offers("reject"));
        assert_eq!(request.payload.default_option().unwrap().id, "approve");
    }

    #[test]
    fn test_payload_serializes_options() {
        let payload = SuspendRequest::new("t", vec![ReviewOption::new("approve", "Approve")]).payload;
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"task": "t", "context": {}, "options": [{"id": "approve", "label": "Approve"}]})
        );
    }

    #[test]
    fn test_step_error_builders() {
        let err = StepError::categorized(ErrorCategory::Permission, "denied")
            .with_context("table", json!("sales"));
        assert_eq!(err.category, Some(ErrorCategory::Permission));
        assert_eq!(err.to_string(), "denied");
        assert_eq!(err.context["table"], json!("sales"));
    }
}
