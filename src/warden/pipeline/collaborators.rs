// SPDX-License-Identifier: MIT

//! Opaque services the pipeline steps call out to
//!
//! Question matching, query writing, result validation and report
//! rendering are not this crate's business; each sits behind a trait so a
//! deployment plugs in its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::state::ValidationDecision;
use crate::warden::admission::{QueryExecutor, QueryProbe, Row};
use crate::warden::workflow::step::StepError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    /// How sure the interpreter is that it understood the question, 0..=1
    pub confidence: f64,
    pub matched: Vec<String>,
}

#[async_trait]
pub trait QuestionInterpreter: Send + Sync {
    async fn interpret(&self, question: &str) -> Result<Interpretation, StepError>;
}

/// Everything the planner is told about previous attempts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub question: String,
    pub previous_sql: Option<String>,
    /// Admission and validation feedback, plus recovery's validation errors
    pub feedback: Vec<String>,
    /// Reviewer-requested changes
    pub modifications: Vec<String>,
    pub simpler: bool,
}

#[async_trait]
pub trait QueryPlanner: Send + Sync {
    /// Return the SQL to run
    async fn plan(&self, request: &PlanRequest) -> Result<String, StepError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub decision: ValidationDecision,
    pub reasoning: String,
    pub suggestions: Vec<String>,
}

#[async_trait]
pub trait ResultValidator: Send + Sync {
    async fn validate(&self, question: &str, sql: &str, rows: &[Row]) -> Result<Validation, StepError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub question: String,
    pub rows: Vec<Row>,
    pub chart: String,
    pub preferences: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub location: Option<String>,
}

#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn write(&self, request: &ReportRequest) -> Result<Report, StepError>;
}

/// The full set of services a pipeline is built with
#[derive(Clone)]
pub struct Collaborators {
    pub interpreter: Arc<dyn QuestionInterpreter>,
    pub planner: Arc<dyn QueryPlanner>,
    pub probe: Arc<dyn QueryProbe>,
    pub executor: Arc<dyn QueryExecutor>,
    pub validator: Arc<dyn ResultValidator>,
    pub writer: Arc<dyn ReportWriter>,
}
