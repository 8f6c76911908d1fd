// SPDX-License-Identifier: MIT

//! Step implementations for the analytical pipeline

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::collaborators::{
    PlanRequest, QueryPlanner, QuestionInterpreter, ReportRequest, ReportWriter, ResultValidator,
};
use super::state::{
    ExecutionPhase, PipelineState, ReportPhase, ReviewPhase, ValidationDecision, ValidationPhase,
    ERROR_SUMMARY, EXECUTION, REPORT, REVIEW, SESSION_ID, STATUS, VALIDATION,
};
use crate::warden::admission::{AdmissionController, QueryDescriptor, QueryError, QueryExecutor};
use crate::warden::checkpoint::RESUME_FIELD;
use crate::warden::resilience::{ErrorCategory, ErrorContext, ErrorSink, ErrorTranslator};
use crate::warden::workflow::graph::ERROR_FIELD;
use crate::warden::workflow::state::{StatePatch, WorkflowState};
use crate::warden::workflow::step::{
    ReviewOption, Step, StepError, StepOutcome, SuspendRequest,
};

/// Rows shown to the reviewer
const REVIEW_SAMPLE_ROWS: usize = 10;
/// Interpretations below this are sent back for clarification
pub const MIN_CONFIDENCE: f64 = 0.5;

fn view(state: &WorkflowState) -> Result<PipelineState, StepError> {
    PipelineState::from_state(state)
        .map_err(|e| StepError::new(format!("Malformed pipeline state: {}", e)))
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

pub struct AnalyzeQuestion {
    interpreter: Arc<dyn QuestionInterpreter>,
}

impl AnalyzeQuestion {
    pub fn new(interpreter: Arc<dyn QuestionInterpreter>) -> Self {
        Self { interpreter }
    }
}

#[async_trait]
impl Step for AnalyzeQuestion {
    fn name(&self) -> &str {
        "analyze_question"
    }

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError> {
        let view = view(state)?;
        let question = view.question_text().trim();
        if question.is_empty() {
            return Err(StepError::categorized(
                ErrorCategory::InvalidQuestion,
                "No question was provided",
            ));
        }

        let interpretation = self.interpreter.interpret(question).await?;
        log::info!(
            "Question interpreted with confidence {:.2} ({} matches)",
            interpretation.confidence,
            interpretation.matched.len()
        );
        Ok(StepOutcome::update(
            StatePatch::new()
                .set("question.confidence", json!(interpretation.confidence))
                .set("question.matched", json!(interpretation.matched)),
        ))
    }
}

pub struct GenerateQuery {
    planner: Arc<dyn QueryPlanner>,
}

impl GenerateQuery {
    pub fn new(planner: Arc<dyn QueryPlanner>) -> Self {
        Self { planner }
    }
}

#[async_trait]
impl Step for GenerateQuery {
    fn name(&self) -> &str {
        "generate_query"
    }

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError> {
        let view = view(state)?;
        let generation = view.generation.clone().unwrap_or_default();
        let review = view.review.clone().unwrap_or_default();

        let mut feedback = generation.improvement_suggestions.clone();
        feedback.extend(generation.validation_errors.iter().cloned());
        if let Some(error) = view
            .execution
            .as_ref()
            .filter(|e| !e.success)
            .and_then(|e| e.error.clone())
        {
            feedback.push(error);
        }

        let request = PlanRequest {
            question: view.question_text().to_string(),
            previous_sql: match review.decision.as_str() {
                "regenerate" => None,
                _ => view.sql().map(str::to_string),
            },
            feedback,
            modifications: match review.decision.as_str() {
                "modify" => review.modifications.clone(),
                _ => Vec::new(),
            },
            simpler: generation.use_simpler_template || generation.retry_generation,
        };

        let sql = self.planner.plan(&request).await?;
        let attempts = generation.attempts + 1;
        log::info!("Generated query (attempt {}): {} chars", attempts, sql.len());

        Ok(StepOutcome::update(
            StatePatch::new()
                .set("generation.sql", json!(sql))
                .set("generation.attempts", json!(attempts))
                .set("generation.retry_generation", json!(false))
                .set("generation.validation_errors", json!([]))
                .set("generation.improvement_suggestions", json!([])),
        ))
    }
}

/// Dry-runs the query through admission control, then executes it.
///
/// A query the service calls invalid, or one admission refuses, is not a
/// step failure: it comes back as an unsuccessful execution with feedback
/// for the planner so the graph can route to regeneration.
pub struct ExecuteQuery {
    admission: AdmissionController,
    executor: Arc<dyn QueryExecutor>,
}

impl ExecuteQuery {
    pub fn new(admission: AdmissionController, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            admission,
            executor,
        }
    }

    fn unsuccessful(error: String, admission: Option<Value>, suggestions: Vec<String>) -> StepOutcome {
        let execution = ExecutionPhase {
            success: false,
            error: Some(error),
            admission,
            ..ExecutionPhase::default()
        };
        StepOutcome::update(
            StatePatch::new()
                .set(EXECUTION, to_value(&execution))
                .set("generation.improvement_suggestions", json!(suggestions)),
        )
    }
}

#[async_trait]
impl Step for ExecuteQuery {
    fn name(&self) -> &str {
        "execute_query"
    }

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError> {
        let view = view(state)?;
        let Some(sql) = view.sql() else {
            return Err(StepError::categorized(
                ErrorCategory::Syntax,
                "No SQL query available to execute",
            ));
        };
        let mut query = QueryDescriptor::new(sql)
            .with_label("generation_attempt", json!(view.attempts()));
        if let Some(session) = &view.session_id {
            query = query.with_label(SESSION_ID, json!(session));
        }

        let decision = match self.admission.estimate(&query).await {
            Ok(decision) => decision,
            Err(QueryError::Invalid(message)) => {
                let hint = format!("Fix the query so it passes a dry run: {}", message);
                return Ok(Self::unsuccessful(message, None, vec![hint]));
            }
            Err(QueryError::Service(message)) => {
                return Err(StepError::new(message).with_context("phase", json!("dry_run")));
            }
        };
        let admission = Some(to_value(&decision));

        let Some(ticket) = decision.ticket() else {
            return Ok(Self::unsuccessful(
                decision.rationale.clone(),
                admission,
                decision.suggestions.clone(),
            ));
        };

        match self.executor.execute(&query, ticket.budget(), ticket).await {
            Ok(result) if result.rows.is_empty() => Err(StepError::categorized(
                ErrorCategory::EmptyResult,
                "Query returned zero rows",
            )
            .with_context("bytes_processed", json!(result.bytes_processed))),
            Ok(result) => {
                log::info!(
                    "Query returned {} rows, {} bytes processed",
                    result.rows.len(),
                    result.bytes_processed
                );
                let execution = ExecutionPhase {
                    success: true,
                    row_count: result.rows.len(),
                    rows: result.rows,
                    bytes_processed: result.bytes_processed,
                    error: None,
                    admission,
                };
                Ok(StepOutcome::update(
                    StatePatch::new().set(EXECUTION, to_value(&execution)),
                ))
            }
            Err(QueryError::Invalid(message)) => {
                let hint = format!("Fix the query: {}", message);
                Ok(Self::unsuccessful(message, admission, vec![hint]))
            }
            Err(QueryError::Service(message)) => {
                Err(StepError::new(message).with_context("phase", json!("execute")))
            }
        }
    }
}

pub struct ValidateResults {
    validator: Arc<dyn ResultValidator>,
}

impl ValidateResults {
    pub fn new(validator: Arc<dyn ResultValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Step for ValidateResults {
    fn name(&self) -> &str {
        "validate_results"
    }

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError> {
        let view = view(state)?;
        let rows = view.execution.as_ref().map(|e| e.rows.as_slice()).unwrap_or(&[]);
        let validation = self
            .validator
            .validate(view.question_text(), view.sql().unwrap_or_default(), rows)
            .await?;
        log::info!("Validation decision: {:?}", validation.decision);

        let mut patch = StatePatch::new().set(
            VALIDATION,
            to_value(&ValidationPhase {
                decision: validation.decision,
                reasoning: validation.reasoning,
                suggestions: validation.suggestions.clone(),
            }),
        );
        if validation.decision != ValidationDecision::Approved {
            patch.insert("generation.improvement_suggestions", json!(validation.suggestions));
        }
        Ok(StepOutcome::update(patch))
    }
}

/// Pauses the thread for a reviewer to approve, modify or regenerate
pub struct HumanReview;

impl HumanReview {
    pub fn options() -> Vec<ReviewOption> {
        vec![
            ReviewOption::new("approve", "Approve and proceed with the report"),
            ReviewOption::new("modify", "Request modifications to the query"),
            ReviewOption::new("regenerate", "Regenerate the query from scratch"),
        ]
    }
}

#[async_trait]
impl Step for HumanReview {
    fn name(&self) -> &str {
        "human_review"
    }

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError> {
        let view = view(state)?;
        let execution = view.execution.clone().unwrap_or_default();
        let sample: Vec<_> = execution.rows.iter().take(REVIEW_SAMPLE_ROWS).cloned().collect();

        let mut recommended = vec!["table", "bar_chart"];
        let has_numeric = sample
            .first()
            .is_some_and(|row| row.values().any(Value::is_number));
        if has_numeric {
            recommended.push("line_chart");
        }

        let mut context = Map::new();
        context.insert("question".to_string(), json!(view.question_text()));
        context.insert("sql".to_string(), json!(view.sql()));
        context.insert(
            "validation_reasoning".to_string(),
            json!(view.validation.map(|v| v.reasoning).unwrap_or_default()),
        );
        context.insert("row_count".to_string(), json!(execution.row_count));
        context.insert("data_sample".to_string(), json!(sample));
        context.insert("recommended_charts".to_string(), json!(recommended));
        context.insert(
            "available_charts".to_string(),
            json!(["table", "bar_chart", "line_chart", "pie_chart", "scatter_plot"]),
        );

        Ok(StepOutcome::Suspend(
            SuspendRequest::new(
                "Please review the query results and choose how to proceed",
                Self::options(),
            )
            .with_context(context)
            .with_patch(StatePatch::new().set(STATUS, json!("awaiting_review"))),
        ))
    }
}

/// Fill in chart preferences the reviewer left unset
pub fn apply_preference_defaults(chart: &str, preferences: &mut Map<String, Value>) {
    let defaults = match chart {
        "bar_chart" => vec![
            ("orientation", json!("vertical")),
            ("color_scheme", json!("default")),
        ],
        "line_chart" => vec![("show_markers", json!(true)), ("smooth_lines", json!(false))],
        "pie_chart" => vec![
            ("show_percentages", json!(true)),
            ("explode_largest", json!(false)),
        ],
        _ => Vec::new(),
    };
    for (key, value) in defaults {
        preferences.entry(key.to_string()).or_insert(value);
    }
    preferences
        .entry("include_data_table".to_string())
        .or_insert(json!(true));
    preferences
        .entry("title".to_string())
        .or_insert(json!("Analysis Results"));
}

/// Turns the reviewer's resume input into the review phase.
///
/// Runs right after `human_review` resumes; the suspended node itself is
/// never re-run.
pub struct RecordReview;

#[async_trait]
impl Step for RecordReview {
    fn name(&self) -> &str {
        "record_review"
    }

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError> {
        let decision = state
            .get_str(&format!("{}.decision", RESUME_FIELD))
            .unwrap_or("approve")
            .to_string();
        let payload = state
            .get_path(&format!("{}.payload", RESUME_FIELD))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let chart = payload
            .get("chart_selection")
            .and_then(Value::as_str)
            .unwrap_or("table")
            .to_string();
        let mut preferences = payload
            .get("preferences")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        apply_preference_defaults(&chart, &mut preferences);
        let modifications: Vec<String> = payload
            .get("modifications")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        log::info!("Reviewer decision: {}", decision);
        let review = ReviewPhase {
            decision: decision.clone(),
            chart_selection: chart,
            preferences,
            modifications,
        };
        let mut patch = StatePatch::new()
            .set(REVIEW, to_value(&review))
            .set(STATUS, json!("in_progress"));
        if decision == "modify" || decision == "regenerate" {
            // Reviewer-directed rework gets a fresh regeneration allowance
            patch.insert("generation.attempts", json!(0));
        }
        Ok(StepOutcome::update(patch))
    }
}

pub struct GenerateReport {
    writer: Arc<dyn ReportWriter>,
}

impl GenerateReport {
    pub fn new(writer: Arc<dyn ReportWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl Step for GenerateReport {
    fn name(&self) -> &str {
        "generate_report"
    }

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError> {
        let view = view(state)?;
        let review = view.review.clone().unwrap_or_default();
        let mut preferences = review.preferences;
        let chart = if review.chart_selection.is_empty() {
            "table".to_string()
        } else {
            review.chart_selection
        };
        apply_preference_defaults(&chart, &mut preferences);

        let request = ReportRequest {
            question: view.question_text().to_string(),
            rows: view.execution.map(|e| e.rows).unwrap_or_default(),
            chart,
            preferences,
        };
        let report = self.writer.write(&request).await?;
        log::info!("Report '{}' generated", report.title);

        Ok(StepOutcome::update(
            StatePatch::new()
                .set(
                    REPORT,
                    to_value(&ReportPhase {
                        title: report.title,
                        summary: report.summary,
                        location: report.location,
                    }),
                )
                .set(STATUS, json!("completed")),
        ))
    }
}

/// Final node for threads that could not produce a report.
///
/// Reached either by routing (low confidence, regeneration exhausted) or
/// run once by the executor after a halt, in which case the translated
/// error is already in state.
pub struct HandleError {
    translator: ErrorTranslator,
    sink: Arc<dyn ErrorSink>,
}

impl HandleError {
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            translator: ErrorTranslator::new(),
            sink,
        }
    }

    /// Explain a routed failure that never raised a step error
    fn routed_failure(view: &PipelineState) -> ErrorContext {
        let session = view.session_id.as_deref().unwrap_or("unknown");
        let (step, category, message) = match (&view.question, &view.execution, &view.validation) {
            (Some(q), _, _) if q.confidence.is_some_and(|c| c < MIN_CONFIDENCE) => (
                "analyze_question",
                ErrorCategory::InvalidQuestion,
                format!(
                    "Question confidence {:.2} is below {:.2}",
                    q.confidence.unwrap_or_default(),
                    MIN_CONFIDENCE
                ),
            ),
            (_, Some(e), _) if !e.success => {
                let refused = e
                    .admission
                    .as_ref()
                    .and_then(|a| a.get("verdict"))
                    .and_then(Value::as_str)
                    == Some("reject");
                let category = if refused {
                    ErrorCategory::OversizedResult
                } else {
                    ErrorCategory::Syntax
                };
                (
                    "execute_query",
                    category,
                    e.error.clone().unwrap_or_else(|| "Query execution failed".to_string()),
                )
            }
            (_, _, Some(v)) => (
                "validate_results",
                ErrorCategory::Unclassified,
                format!("Results failed validation: {}", v.reasoning),
            ),
            _ => (
                "workflow",
                ErrorCategory::Unclassified,
                "Workflow ended without a report".to_string(),
            ),
        };
        ErrorContext::new(session, step, category, message)
            .with_user_request(view.question_text())
            .with_retry_count(view.attempts())
    }
}

#[async_trait]
impl Step for HandleError {
    fn name(&self) -> &str {
        "handle_error"
    }

    async fn run(&self, state: &WorkflowState) -> Result<StepOutcome, StepError> {
        let summary = match state.get(ERROR_FIELD) {
            Some(error) => json!({
                "failed_step": error.get("technical").and_then(|t| t.get("step_name")),
                "category": error.get("technical").and_then(|t| t.get("category")),
                "user_message": error.get("user"),
            }),
            None => {
                let view = view(state)?;
                let context = Self::routed_failure(&view);
                self.sink.record(&context).await;
                let translated = self.translator.translate(&context);
                json!({
                    "failed_step": context.step_name,
                    "category": context.category,
                    "user_message": translated.user_message,
                })
            }
        };
        log::error!("Pipeline failed: {}", summary);

        Ok(StepOutcome::update(
            StatePatch::new()
                .set(STATUS, json!("failed"))
                .set(ERROR_SUMMARY, summary),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::admission::{
        AdmissionSettings, AdmissionTicket, ExecutionBudget, QueryResult,
    };
    use crate::warden::pipeline::simulated::SimulatedWarehouse;
    use crate::warden::resilience::MemoryErrorLog;
    use std::sync::Mutex;

    /// Answers every query with one row and remembers what it was sent
    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<QueryDescriptor>>,
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn execute(
            &self,
            query: &QueryDescriptor,
            _budget: ExecutionBudget,
            _ticket: &AdmissionTicket,
        ) -> Result<QueryResult, QueryError> {
            self.seen.lock().unwrap().push(query.clone());
            Ok(QueryResult {
                rows: vec![json!({"brand": "Acme"}).as_object().cloned().unwrap()],
                bytes_processed: 1024,
            })
        }
    }

    fn resumed(decision: &str, payload: Value) -> WorkflowState {
        let mut state = PipelineState::for_question("s1", "Revenue by brand");
        state.update(RESUME_FIELD, json!({"decision": decision, "payload": payload}));
        state
    }

    #[test]
    fn test_bar_chart_defaults() {
        let mut prefs = Map::new();
        prefs.insert("orientation".to_string(), json!("horizontal"));
        apply_preference_defaults("bar_chart", &mut prefs);
        assert_eq!(prefs["orientation"], json!("horizontal"));
        assert_eq!(prefs["color_scheme"], json!("default"));
        assert_eq!(prefs["include_data_table"], json!(true));
        assert_eq!(prefs["title"], json!("Analysis Results"));
    }

    #[test]
    fn test_line_and_pie_defaults() {
        let mut line = Map::new();
        apply_preference_defaults("line_chart", &mut line);
        assert_eq!(line["show_markers"], json!(true));
        assert_eq!(line["smooth_lines"], json!(false));

        let mut pie = Map::new();
        apply_preference_defaults("pie_chart", &mut pie);
        assert_eq!(pie["show_percentages"], json!(true));
        assert_eq!(pie["explode_largest"], json!(false));
        assert!(!pie.contains_key("orientation"));
    }

    #[tokio::test]
    async fn test_record_review_modify_resets_attempts() {
        let state = resumed(
            "modify",
            json!({"chart_selection": "pie_chart", "modifications": ["Only 2024"]}),
        );
        let StepOutcome::Update(patch) = RecordReview.run(&state).await.unwrap() else {
            panic!("expected update");
        };
        let review = patch.get(REVIEW).unwrap();
        assert_eq!(review["decision"], json!("modify"));
        assert_eq!(review["chart_selection"], json!("pie_chart"));
        assert_eq!(review["modifications"], json!(["Only 2024"]));
        assert_eq!(review["preferences"]["show_percentages"], json!(true));
        assert_eq!(patch.get("generation.attempts"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_record_review_approve_keeps_attempts() {
        let state = resumed("approve", Value::Null);
        let StepOutcome::Update(patch) = RecordReview.run(&state).await.unwrap() else {
            panic!("expected update");
        };
        assert_eq!(patch.get(REVIEW).unwrap()["chart_selection"], json!("table"));
        assert!(patch.get("generation.attempts").is_none());
    }

    #[tokio::test]
    async fn test_execute_query_labels_session_and_attempt() {
        let executor = Arc::new(RecordingExecutor::default());
        let step = ExecuteQuery::new(
            AdmissionController::new(
                Arc::new(SimulatedWarehouse::new(1.0)),
                AdmissionSettings::default(),
            ),
            executor.clone(),
        );
        let mut state = PipelineState::for_question("s9", "Revenue by brand");
        state.set_path("generation.sql", json!("SELECT brand FROM sales"));
        state.set_path("generation.attempts", json!(2));

        let StepOutcome::Update(patch) = step.run(&state).await.unwrap() else {
            panic!("expected update");
        };
        assert_eq!(patch.get(EXECUTION).unwrap()["success"], json!(true));

        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].sql, "SELECT brand FROM sales");
        assert_eq!(seen[0].labels[SESSION_ID], json!("s9"));
        assert_eq!(seen[0].labels["generation_attempt"], json!(2));
    }

    #[tokio::test]
    async fn test_human_review_suspends_with_three_options() {
        let mut state = PipelineState::for_question("s1", "Revenue by brand");
        state.set_path(
            "execution",
            json!({"success": true, "rows": [{"brand": "Acme", "revenue": 10.5}], "row_count": 1}),
        );
        let StepOutcome::Suspend(request) = HumanReview.run(&state).await.unwrap() else {
            panic!("expected suspension");
        };
        let ids: Vec<&str> = request.payload.options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["approve", "modify", "regenerate"]);
        assert_eq!(
            request.payload.context["recommended_charts"],
            json!(["table", "bar_chart", "line_chart"])
        );
        assert_eq!(request.patch.get(STATUS), Some(&json!("awaiting_review")));
    }

    #[tokio::test]
    async fn test_handle_error_explains_low_confidence() {
        let log = Arc::new(MemoryErrorLog::new());
        let mut state = PipelineState::for_question("s1", "What is love?");
        state.set_path("question.confidence", json!(0.2));

        let StepOutcome::Update(patch) = HandleError::new(log.clone()).run(&state).await.unwrap() else {
            panic!("expected update");
        };
        assert_eq!(patch.get(STATUS), Some(&json!("failed")));
        let summary = patch.get(ERROR_SUMMARY).unwrap();
        assert_eq!(summary["category"], json!("invalid_question"));
        assert_eq!(summary["user_message"]["title"], json!("Question Not Understood"));
        assert_eq!(log.records().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_error_reuses_halt_error() {
        let log = Arc::new(MemoryErrorLog::new());
        let mut state = PipelineState::for_question("s1", "q");
        state.update(
            ERROR_FIELD,
            json!({"user": {"title": "Access Restricted"}, "technical": {"step_name": "execute_query", "category": "permission"}}),
        );
        let StepOutcome::Update(patch) = HandleError::new(log.clone()).run(&state).await.unwrap() else {
            panic!("expected update");
        };
        let summary = patch.get(ERROR_SUMMARY).unwrap();
        assert_eq!(summary["failed_step"], json!("execute_query"));
        assert_eq!(summary["user_message"]["title"], json!("Access Restricted"));
        assert!(log.records().is_empty());
    }
}
