// SPDX-License-Identifier: MIT

//! Category-specific compensating actions
//!
//! A strategy never re-runs the failed step. It inspects the values the
//! node captured into the error context (the query text under [`SQL_KEY`],
//! sample rows under [`SAMPLE_KEY`], and so on) and returns a patch keyed by
//! those same capture keys. The executor maps the keys back onto state paths
//! before the next attempt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::category::ErrorCategory;
use super::context::ErrorContext;
use crate::warden::workflow::state::StatePatch;

/// Capture key holding the query text
pub const SQL_KEY: &str = "sql";
/// Capture key holding sample rows fed to a model
pub const SAMPLE_KEY: &str = "sample_data";

/// What the executor should do with a recovery outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryDisposition {
    /// Apply the patch, then retry
    Patched,
    /// Nothing to change; retry after backoff
    RetryAsIs,
    /// No automatic fix exists; halt
    Declined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOutcome {
    pub disposition: RecoveryDisposition,
    pub patch: StatePatch,
    pub actions: Vec<String>,
    pub user_guidance: String,
}

impl RecoveryOutcome {
    fn patched(patch: StatePatch, actions: &[&str], guidance: &str) -> Self {
        Self::build(RecoveryDisposition::Patched, patch, actions, guidance)
    }

    fn retry(actions: &[&str], guidance: &str) -> Self {
        Self::build(RecoveryDisposition::RetryAsIs, StatePatch::new(), actions, guidance)
    }

    fn declined(actions: &[&str], guidance: impl Into<String>) -> Self {
        Self::build(RecoveryDisposition::Declined, StatePatch::new(), actions, guidance)
    }

    fn build(
        disposition: RecoveryDisposition,
        patch: StatePatch,
        actions: &[&str],
        guidance: impl Into<String>,
    ) -> Self {
        Self {
            disposition,
            patch,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            user_guidance: guidance.into(),
        }
    }

    fn with_patch(mut self, patch: StatePatch) -> Self {
        self.patch = patch;
        self
    }

    pub fn recovered(&self) -> bool {
        self.disposition != RecoveryDisposition::Declined
    }
}

/// Knobs for the built-in strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Predicate ANDed into the WHERE clause when a quota is hit
    pub quota_date_filter: String,
    pub quota_row_limit: u64,
    pub oversized_row_limit: u64,
    pub sample_rows: usize,
    pub max_text_chars: usize,
    pub max_list_items: usize,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            quota_date_filter: "order_date >= DATE_SUB(CURRENT_DATE(), INTERVAL 90 DAY)"
                .to_string(),
            quota_row_limit: 100,
            oversized_row_limit: 1000,
            sample_rows: 50,
            max_text_chars: 1000,
            max_list_items: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryManager {
    settings: RecoverySettings,
}

impl RecoveryManager {
    pub fn new(settings: RecoverySettings) -> Self {
        Self { settings }
    }

    pub fn attempt_recovery(&self, ctx: &ErrorContext) -> RecoveryOutcome {
        let outcome = match ctx.category {
            ErrorCategory::Quota => self.tighten_query(ctx),
            ErrorCategory::Syntax => self.force_regeneration(ctx),
            ErrorCategory::Timeout => self.simplify_inputs(ctx),
            ErrorCategory::ContextLength => self.truncate_sample(ctx),
            ErrorCategory::OversizedResult => self.limit_rows(ctx),
            ErrorCategory::EmptyResult => broadening_suggestions(),
            ErrorCategory::Unclassified => RecoveryOutcome::retry(
                &["retry_unchanged"],
                "An unexpected error occurred. Retrying the step.",
            ),
            other => RecoveryOutcome::declined(
                &[],
                format!("No automatic recovery available for {}", other),
            ),
        };
        log::debug!(
            "Recovery for {} at '{}': {:?} {:?}",
            ctx.category,
            ctx.step_name,
            outcome.disposition,
            outcome.actions
        );
        outcome
    }

    fn tighten_query(&self, ctx: &ErrorContext) -> RecoveryOutcome {
        match captured_str(ctx, SQL_KEY) {
            Some(sql) => {
                let tightened = add_date_filter_and_limit(
                    sql,
                    &self.settings.quota_date_filter,
                    self.settings.quota_row_limit,
                );
                RecoveryOutcome::patched(
                    StatePatch::new().set(SQL_KEY, Value::String(tightened)),
                    &["reduced_query_complexity", "added_date_filters"],
                    "Query has been optimized to reduce data processing requirements.",
                )
            }
            None => RecoveryOutcome::retry(
                &["suggest_wait_and_retry"],
                "Quota exceeded. Please wait a few minutes and try again, or use a more specific date range.",
            ),
        }
    }

    fn force_regeneration(&self, ctx: &ErrorContext) -> RecoveryOutcome {
        let patch = StatePatch::new()
            .set("retry_generation", Value::Bool(true))
            .set("use_simpler_template", Value::Bool(true))
            .set("validation_errors", Value::String(ctx.message.clone()));
        RecoveryOutcome::declined(
            &["trigger_query_regeneration"],
            "Query syntax error detected. Regenerating the query with stricter validation.",
        )
        .with_patch(patch)
    }

    /// Shorten oversized model inputs. The query text is left alone: a cut
    /// query is invalid SQL, and a slow warehouse only needs backoff.
    fn simplify_inputs(&self, ctx: &ErrorContext) -> RecoveryOutcome {
        let mut patch = StatePatch::new();
        for (key, value) in &ctx.additional_context {
            if key == SQL_KEY {
                continue;
            }
            if let Some(shorter) = self.shorten(value) {
                patch.insert(key.clone(), shorter);
            }
        }
        if patch.is_empty() {
            return RecoveryOutcome::retry(
                &["retry_with_backoff"],
                "The request timed out. Retrying shortly.",
            );
        }
        RecoveryOutcome::patched(
            patch,
            &["reduced_input_complexity", "use_shorter_prompt"],
            "Request simplified to improve response time.",
        )
    }

    fn shorten(&self, value: &Value) -> Option<Value> {
        match value {
            Value::String(s) if s.chars().count() > self.settings.max_text_chars => {
                let head: String = s.chars().take(self.settings.max_text_chars).collect();
                Some(Value::String(format!("{}...", head)))
            }
            Value::Array(items) if items.len() > self.settings.max_list_items => Some(
                Value::Array(items[..self.settings.max_list_items].to_vec()),
            ),
            _ => None,
        }
    }

    fn truncate_sample(&self, ctx: &ErrorContext) -> RecoveryOutcome {
        match ctx.additional_context.get(SAMPLE_KEY) {
            Some(Value::Array(rows)) => {
                let kept = rows.iter().take(self.settings.sample_rows).cloned().collect();
                RecoveryOutcome::patched(
                    StatePatch::new().set(SAMPLE_KEY, Value::Array(kept)),
                    &["truncated_sample_data"],
                    "Sample data has been reduced to fit processing limits.",
                )
            }
            _ => RecoveryOutcome::declined(
                &["suggest_simpler_question"],
                "Question complexity exceeds processing limits. Please try a more specific question.",
            ),
        }
    }

    fn limit_rows(&self, ctx: &ErrorContext) -> RecoveryOutcome {
        match captured_str(ctx, SQL_KEY) {
            Some(sql) if !sql.to_ascii_uppercase().contains("LIMIT") => {
                let limited = format!(
                    "{} LIMIT {};",
                    sql.trim_end().trim_end_matches(';'),
                    self.settings.oversized_row_limit
                );
                RecoveryOutcome::patched(
                    StatePatch::new().set(SQL_KEY, Value::String(limited)),
                    &["added_limit_clause"],
                    &format!(
                        "Query has been limited to {} rows to manage data size.",
                        self.settings.oversized_row_limit
                    ),
                )
            }
            _ => RecoveryOutcome::declined(
                &["suggest_aggregation"],
                "Dataset is too large. Consider requesting summary statistics instead of detailed data.",
            ),
        }
    }
}

fn broadening_suggestions() -> RecoveryOutcome {
    let suggestions = [
        "Expand the date range for your analysis",
        "Remove restrictive filters (brand, category, etc.)",
        "Check if the requested data exists in the database",
        "Try a broader version of your question",
    ];
    RecoveryOutcome::declined(
        &["provide_suggestions"],
        format!("No data found. Try these suggestions: {}", suggestions.join("; ")),
    )
}

fn captured_str<'a>(ctx: &'a ErrorContext, key: &str) -> Option<&'a str> {
    ctx.additional_context
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// AND `filter` into an existing WHERE clause (ahead of any GROUP BY, ORDER BY
/// or LIMIT) and append `LIMIT n` when the query has none.
fn add_date_filter_and_limit(sql: &str, filter: &str, limit: u64) -> String {
    let trimmed = sql.trim_end();
    let had_semicolon = trimmed.ends_with(';');
    let body = trimmed.trim_end_matches(';').trim_end();
    // ASCII uppercasing keeps byte offsets aligned with `body`
    let upper = body.to_ascii_uppercase();

    let mut out = match upper.find("WHERE") {
        Some(where_at) => {
            let tail_at = ["GROUP BY", "ORDER BY", "LIMIT"]
                .iter()
                .filter_map(|kw| upper[where_at..].find(kw).map(|i| i + where_at))
                .min()
                .unwrap_or(body.len());
            let (head, tail) = body.split_at(tail_at);
            format!("{} AND {} {}", head.trim_end(), filter, tail)
                .trim_end()
                .to_string()
        }
        None => body.to_string(),
    };

    if upper.contains("LIMIT") {
        if had_semicolon {
            out.push(';');
        }
    } else {
        out.push_str(&format!(" LIMIT {};", limit));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn ctx(category: ErrorCategory, captured: Value) -> ErrorContext {
        let context: Map<String, Value> = match captured {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ErrorContext::new("s1", "execute_query", category, "boom").with_context(context)
    }

    #[test]
    fn test_quota_tightens_query() {
        let manager = RecoveryManager::default();
        let outcome = manager.attempt_recovery(&ctx(
            ErrorCategory::Quota,
            json!({"sql": "SELECT brand, SUM(units) FROM sales WHERE year = 2024 GROUP BY brand"}),
        ));
        assert_eq!(outcome.disposition, RecoveryDisposition::Patched);
        assert_eq!(
            outcome.patch.get(SQL_KEY),
            Some(&json!(
                "SELECT brand, SUM(units) FROM sales WHERE year = 2024 AND order_date >= DATE_SUB(CURRENT_DATE(), INTERVAL 90 DAY) GROUP BY brand LIMIT 100;"
            ))
        );
    }

    #[test]
    fn test_quota_without_where_only_limits() {
        assert_eq!(
            add_date_filter_and_limit("SELECT * FROM sales;", "d > 1", 100),
            "SELECT * FROM sales LIMIT 100;"
        );
        assert_eq!(
            add_date_filter_and_limit("SELECT * FROM sales where a = 1 LIMIT 5", "d > 1", 100),
            "SELECT * FROM sales where a = 1 AND d > 1 LIMIT 5"
        );
    }

    #[test]
    fn test_quota_without_query_retries() {
        let outcome = RecoveryManager::default().attempt_recovery(&ctx(ErrorCategory::Quota, json!({})));
        assert_eq!(outcome.disposition, RecoveryDisposition::RetryAsIs);
        assert!(outcome.recovered());
        assert!(outcome.patch.is_empty());
    }

    #[test]
    fn test_syntax_declines_with_regeneration_flags() {
        let outcome = RecoveryManager::default().attempt_recovery(&ctx(ErrorCategory::Syntax, json!({})));
        assert!(!outcome.recovered());
        assert_eq!(outcome.patch.get("retry_generation"), Some(&json!(true)));
        assert_eq!(outcome.patch.get("use_simpler_template"), Some(&json!(true)));
        assert_eq!(outcome.patch.get("validation_errors"), Some(&json!("boom")));
    }

    #[test]
    fn test_timeout_shortens_long_inputs() {
        let long_text = "x".repeat(1500);
        let rows: Vec<Value> = (0..25).map(|i| json!(i)).collect();
        let outcome = RecoveryManager::default().attempt_recovery(&ctx(
            ErrorCategory::Timeout,
            json!({"prompt": long_text, "rows": rows, "sql": "SELECT 1"}),
        ));
        assert_eq!(outcome.disposition, RecoveryDisposition::Patched);
        let prompt = outcome.patch.get("prompt").and_then(Value::as_str).unwrap();
        assert_eq!(prompt.len(), 1003);
        assert!(prompt.ends_with("..."));
        assert_eq!(outcome.patch.get("rows").and_then(Value::as_array).unwrap().len(), 10);
        assert!(outcome.patch.get("sql").is_none());
    }

    #[test]
    fn test_timeout_never_cuts_long_query() {
        let columns: Vec<String> = (0..60).map(|i| format!("SUM(metric_{i}) AS m{i}")).collect();
        let sql = format!("SELECT brand, {} FROM sales GROUP BY brand", columns.join(", "));
        assert!(sql.len() > 1000);

        let outcome = RecoveryManager::default()
            .attempt_recovery(&ctx(ErrorCategory::Timeout, json!({"sql": sql})));
        assert_eq!(outcome.disposition, RecoveryDisposition::RetryAsIs);
        assert!(outcome.patch.get(SQL_KEY).is_none());
    }

    #[test]
    fn test_timeout_with_small_inputs_retries_as_is() {
        let outcome = RecoveryManager::default()
            .attempt_recovery(&ctx(ErrorCategory::Timeout, json!({"sql": "SELECT 1"})));
        assert_eq!(outcome.disposition, RecoveryDisposition::RetryAsIs);
    }

    #[test]
    fn test_context_length_truncates_sample() {
        let rows: Vec<Value> = (0..80).map(|i| json!({"n": i})).collect();
        let outcome = RecoveryManager::default()
            .attempt_recovery(&ctx(ErrorCategory::ContextLength, json!({"sample_data": rows})));
        assert_eq!(outcome.disposition, RecoveryDisposition::Patched);
        assert_eq!(
            outcome.patch.get(SAMPLE_KEY).and_then(Value::as_array).unwrap().len(),
            50
        );

        let declined = RecoveryManager::default()
            .attempt_recovery(&ctx(ErrorCategory::ContextLength, json!({})));
        assert!(!declined.recovered());
    }

    #[test]
    fn test_oversized_adds_limit_once() {
        let manager = RecoveryManager::default();
        let outcome = manager.attempt_recovery(&ctx(
            ErrorCategory::OversizedResult,
            json!({"sql": "SELECT * FROM sales;"}),
        ));
        assert_eq!(
            outcome.patch.get(SQL_KEY),
            Some(&json!("SELECT * FROM sales LIMIT 1000;"))
        );

        let already_limited = manager.attempt_recovery(&ctx(
            ErrorCategory::OversizedResult,
            json!({"sql": "SELECT * FROM sales LIMIT 1000;"}),
        ));
        assert_eq!(already_limited.disposition, RecoveryDisposition::Declined);
        assert_eq!(already_limited.actions, vec!["suggest_aggregation"]);
    }

    #[test]
    fn test_empty_result_suggests_broadening() {
        let outcome = RecoveryManager::default().attempt_recovery(&ctx(ErrorCategory::EmptyResult, json!({})));
        assert!(!outcome.recovered());
        assert!(outcome.user_guidance.contains("Expand the date range"));
    }

    #[test]
    fn test_permission_has_no_recovery() {
        let outcome = RecoveryManager::default().attempt_recovery(&ctx(ErrorCategory::Permission, json!({})));
        assert_eq!(outcome.disposition, RecoveryDisposition::Declined);
        assert_eq!(
            outcome.user_guidance,
            "No automatic recovery available for permission"
        );
    }

    #[test]
    fn test_unclassified_retries_as_is() {
        let outcome = RecoveryManager::default().attempt_recovery(&ctx(ErrorCategory::Unclassified, json!({})));
        assert_eq!(outcome.disposition, RecoveryDisposition::RetryAsIs);
    }
}
