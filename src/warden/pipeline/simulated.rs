// SPDX-License-Identifier: MIT

//! Deterministic stand-ins for the pipeline's collaborators
//!
//! Used by the `warden` binary's demo commands and by tests. The simulated
//! warehouse scans `scan_gb` for a 90-day window and a quarter of that once
//! the planner has narrowed the window after admission feedback.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::collaborators::{
    Collaborators, Interpretation, PlanRequest, QueryPlanner, QuestionInterpreter, Report,
    ReportRequest, ReportWriter, ResultValidator, Validation,
};
use super::state::ValidationDecision;
use crate::warden::admission::{
    AdmissionTicket, ExecutionBudget, ProbeEstimate, QueryDescriptor, QueryError, QueryExecutor,
    QueryProbe, QueryResult, Row,
};
use crate::warden::workflow::step::StepError;

const BUSINESS_TERMS: [&str; 8] = [
    "revenue", "sales", "profit", "units", "orders", "margin", "brand", "category",
];
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const NARROW_WINDOW: &str = "INTERVAL 30 DAY";

pub struct SimulatedInterpreter;

#[async_trait]
impl QuestionInterpreter for SimulatedInterpreter {
    async fn interpret(&self, question: &str) -> Result<Interpretation, StepError> {
        let lower = question.to_lowercase();
        let matched: Vec<String> = BUSINESS_TERMS
            .iter()
            .filter(|term| lower.contains(*term))
            .map(|term| term.to_string())
            .collect();
        let confidence = (0.3 + 0.25 * matched.len() as f64).min(0.95);
        Ok(Interpretation { confidence, matched })
    }
}

pub struct SimulatedPlanner;

#[async_trait]
impl QueryPlanner for SimulatedPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<String, StepError> {
        let window = if request.feedback.is_empty() && request.previous_sql.is_none() {
            "INTERVAL 90 DAY"
        } else {
            NARROW_WINDOW
        };
        let mut sql = format!(
            "SELECT brand, SUM(revenue) AS revenue FROM sales WHERE order_date >= DATE_SUB(CURRENT_DATE(), {}) GROUP BY brand ORDER BY revenue DESC LIMIT 100",
            window
        );
        if !request.modifications.is_empty() {
            sql = format!("-- {}\n{}", request.modifications.join("; "), sql);
        }
        Ok(sql)
    }
}

/// Probe and executor over a fixed three-brand table
pub struct SimulatedWarehouse {
    scan_gb: f64,
}

impl SimulatedWarehouse {
    pub fn new(scan_gb: f64) -> Self {
        Self { scan_gb }
    }

    fn scan_bytes(&self, sql: &str) -> u64 {
        let gb = if sql.contains(NARROW_WINDOW) {
            self.scan_gb / 4.0
        } else {
            self.scan_gb
        };
        (gb * BYTES_PER_GIB) as u64
    }

    fn rows() -> Vec<Row> {
        [("Acme", 125_000.0), ("Globex", 98_000.5), ("Initech", 40_210.25)]
            .iter()
            .filter_map(|(brand, revenue)| {
                json!({"brand": brand, "revenue": revenue}).as_object().cloned()
            })
            .collect()
    }
}

#[async_trait]
impl QueryProbe for SimulatedWarehouse {
    async fn estimate(&self, query: &QueryDescriptor) -> Result<ProbeEstimate, QueryError> {
        if !query.sql.to_uppercase().contains("SELECT") {
            return Err(QueryError::Invalid("Syntax error: expected SELECT".to_string()));
        }
        Ok(ProbeEstimate {
            bytes: self.scan_bytes(&query.sql),
            rows_hint: Some(3),
        })
    }
}

#[async_trait]
impl QueryExecutor for SimulatedWarehouse {
    async fn execute(
        &self,
        query: &QueryDescriptor,
        budget: ExecutionBudget,
        _ticket: &AdmissionTicket,
    ) -> Result<QueryResult, QueryError> {
        let bytes = self.scan_bytes(&query.sql);
        if bytes > budget.max_bytes_billed {
            return Err(QueryError::Service(
                "Query exceeded limit for bytes billed".to_string(),
            ));
        }
        Ok(QueryResult {
            rows: Self::rows(),
            bytes_processed: bytes,
        })
    }
}

pub struct SimulatedValidator;

#[async_trait]
impl ResultValidator for SimulatedValidator {
    async fn validate(&self, _question: &str, _sql: &str, rows: &[Row]) -> Result<Validation, StepError> {
        if rows.is_empty() {
            return Ok(Validation {
                decision: ValidationDecision::Rejected,
                reasoning: "No rows to validate".to_string(),
                suggestions: vec!["Broaden the filters".to_string()],
            });
        }
        Ok(Validation {
            decision: ValidationDecision::Approved,
            reasoning: format!("{} rows with the expected columns", rows.len()),
            suggestions: Vec::new(),
        })
    }
}

pub struct SimulatedReportWriter;

#[async_trait]
impl ReportWriter for SimulatedReportWriter {
    async fn write(&self, request: &ReportRequest) -> Result<Report, StepError> {
        let title = request
            .preferences
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or("Analysis Results")
            .to_string();
        Ok(Report {
            title,
            summary: format!(
                "{} over {} rows answering: {}",
                request.chart,
                request.rows.len(),
                request.question
            ),
            location: None,
        })
    }
}

impl Collaborators {
    /// Simulated services with a warehouse that scans `scan_gb` per query
    pub fn simulated(scan_gb: f64) -> Self {
        let warehouse = Arc::new(SimulatedWarehouse::new(scan_gb));
        Self {
            interpreter: Arc::new(SimulatedInterpreter),
            planner: Arc::new(SimulatedPlanner),
            probe: warehouse.clone(),
            executor: warehouse,
            validator: Arc::new(SimulatedValidator),
            writer: Arc::new(SimulatedReportWriter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interpreter_confidence_grows_with_terms() {
        let vague = SimulatedInterpreter.interpret("How are things?").await.unwrap();
        let clear = SimulatedInterpreter
            .interpret("Revenue and profit by brand")
            .await
            .unwrap();
        assert!(vague.confidence < 0.5);
        assert!(clear.confidence >= 0.75);
        assert_eq!(clear.matched, vec!["revenue", "profit", "brand"]);
    }

    #[tokio::test]
    async fn test_planner_narrows_after_feedback() {
        let first = SimulatedPlanner.plan(&PlanRequest::default()).await.unwrap();
        let second = SimulatedPlanner
            .plan(&PlanRequest {
                feedback: vec!["Narrow date range".to_string()],
                ..PlanRequest::default()
            })
            .await
            .unwrap();
        let warehouse = SimulatedWarehouse::new(400.0);
        assert_eq!(warehouse.scan_bytes(&first), (400.0 * BYTES_PER_GIB) as u64);
        assert_eq!(warehouse.scan_bytes(&second), (100.0 * BYTES_PER_GIB) as u64);
    }

    #[tokio::test]
    async fn test_probe_rejects_non_select() {
        let err = SimulatedWarehouse::new(1.0)
            .estimate(&QueryDescriptor::new("DROP TABLE sales"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Invalid(_)));
    }
}
