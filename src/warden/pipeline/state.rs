// SPDX-License-Identifier: MIT

//! Typed, phase-oriented view of the pipeline's workflow state
//!
//! Each phase is populated by exactly one kind of node, so a reader can
//! tell from the phase alone how far a thread has got. Steps read through
//! [`PipelineState`] and write back with dotted-path patches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::warden::admission::Row;
use crate::warden::workflow::state::WorkflowState;

pub const QUESTION: &str = "question";
pub const GENERATION: &str = "generation";
pub const EXECUTION: &str = "execution";
pub const VALIDATION: &str = "validation";
pub const REVIEW: &str = "review";
pub const REPORT: &str = "report";
pub const STATUS: &str = "status";
pub const ERROR_SUMMARY: &str = "error_summary";
pub const SESSION_ID: &str = "session_id";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineState {
    pub question: Option<QuestionPhase>,
    pub generation: Option<GenerationPhase>,
    pub execution: Option<ExecutionPhase>,
    pub validation: Option<ValidationPhase>,
    pub review: Option<ReviewPhase>,
    pub report: Option<ReportPhase>,
    pub status: Option<String>,
    pub session_id: Option<String>,
}

impl PipelineState {
    /// Fresh state for a new question
    pub fn for_question(session_id: &str, text: impl Into<String>) -> WorkflowState {
        let mut state = WorkflowState::empty();
        state.update(SESSION_ID, Value::String(session_id.to_string()));
        state.set_path("question.text", Value::String(text.into()));
        state.update(STATUS, Value::String("in_progress".to_string()));
        state
    }

    pub fn from_state(state: &WorkflowState) -> Result<Self, serde_json::Error> {
        serde_json::from_value(state.to_json())
    }

    pub fn question_text(&self) -> &str {
        self.question.as_ref().map(|q| q.text.as_str()).unwrap_or_default()
    }

    pub fn sql(&self) -> Option<&str> {
        self.generation
            .as_ref()
            .and_then(|g| g.sql.as_deref())
            .filter(|sql| !sql.trim().is_empty())
    }

    pub fn attempts(&self) -> u32 {
        self.generation.as_ref().map_or(0, |g| g.attempts)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionPhase {
    pub text: String,
    pub confidence: Option<f64>,
    /// Known questions the interpreter matched against
    pub matched: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationPhase {
    pub sql: Option<String>,
    pub attempts: u32,
    /// Set by recovery after a syntax failure
    pub retry_generation: bool,
    pub use_simpler_template: bool,
    pub validation_errors: Vec<String>,
    /// Feedback from admission or validation for the next attempt
    pub improvement_suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPhase {
    pub success: bool,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub bytes_processed: u64,
    pub error: Option<String>,
    /// The admission decision the execution ran (or was refused) under
    pub admission: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationDecision {
    Approved,
    NeedsRevision,
    #[default]
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPhase {
    pub decision: ValidationDecision,
    pub reasoning: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewPhase {
    pub decision: String,
    pub chart_selection: String,
    pub preferences: Map<String, Value>,
    pub modifications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPhase {
    pub title: String,
    pub summary: String,
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_for_question_populates_only_question() {
        let state = PipelineState::for_question("s1", "Revenue by brand last quarter");
        let view = PipelineState::from_state(&state).unwrap();
        assert_eq!(view.question_text(), "Revenue by brand last quarter");
        assert_eq!(view.status.as_deref(), Some("in_progress"));
        assert_eq!(view.session_id.as_deref(), Some("s1"));
        assert!(view.generation.is_none());
        assert!(view.execution.is_none());
        assert_eq!(view.attempts(), 0);
        assert!(view.sql().is_none());
    }

    #[test]
    fn test_partial_phases_fill_defaults() {
        let mut state = PipelineState::for_question("s1", "q");
        state.set_path("generation.sql", json!("SELECT 1"));
        state.set_path("validation.decision", json!("needs_revision"));

        let view = PipelineState::from_state(&state).unwrap();
        assert_eq!(view.sql(), Some("SELECT 1"));
        assert_eq!(view.attempts(), 0);
        assert_eq!(
            view.validation.unwrap().decision,
            ValidationDecision::NeedsRevision
        );
    }

    #[test]
    fn test_unrelated_fields_are_ignored() {
        let mut state = PipelineState::for_question("s1", "q");
        state.update("resume", json!({"decision": "approve"}));
        assert!(PipelineState::from_state(&state).is_ok());
    }

    #[test]
    fn test_blank_sql_counts_as_missing() {
        let mut state = PipelineState::for_question("s1", "q");
        state.set_path("generation.sql", json!("   "));
        assert!(PipelineState::from_state(&state).unwrap().sql().is_none());
    }
}
