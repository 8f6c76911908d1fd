// SPDX-License-Identifier: MIT

//! The record every caught step failure is wrapped into

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::category::{ErrorCategory, Severity};

/// A classified step failure.
///
/// Built once per failure chain; retries derive a successor with
/// [`ErrorContext::next_attempt`] so category and severity never change.
/// `retry_count` is the number of failed attempts in the chain, this one
/// included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub session_id: String,
    pub step_name: String,
    pub user_request: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
    pub retry_count: u32,
    pub confidence: f64,
    #[serde(default)]
    pub additional_context: Map<String, Value>,
    #[serde(default)]
    pub recovery_suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(
        session_id: impl Into<String>,
        step_name: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            step_name: step_name.into(),
            user_request: String::new(),
            category,
            severity: category.default_severity(),
            message: message.into(),
            retry_count: 0,
            confidence: 1.0,
            additional_context: Map::new(),
            recovery_suggestions: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_user_request(mut self, request: impl Into<String>) -> Self {
        self.user_request = request.into();
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.additional_context.extend(context);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.recovery_suggestions = suggestions;
        self
    }

    /// Successor for the next failure of the same chain: the newest message
    /// and context, same category and severity, one more retry.
    pub fn next_attempt(&self, message: impl Into<String>, context: Map<String, Value>) -> Self {
        let mut next = self.clone();
        next.message = message.into();
        next.additional_context.extend(context);
        next.retry_count += 1;
        next.timestamp = Utc::now();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_uses_default_severity() {
        let ctx = ErrorContext::new("s1", "execute_query", ErrorCategory::Timeout, "timed out");
        assert_eq!(ctx.severity, Severity::Medium);
        assert_eq!(ctx.retry_count, 0);
    }

    #[test]
    fn test_next_attempt_keeps_classification() {
        let first = ErrorContext::new("s1", "execute_query", ErrorCategory::Timeout, "first")
            .with_confidence(0.5);
        let mut extra = Map::new();
        extra.insert("sql".to_string(), json!("SELECT 1"));

        let second = first.next_attempt("second", extra);
        assert_eq!(second.category, ErrorCategory::Timeout);
        assert_eq!(second.severity, Severity::Medium);
        assert_eq!(second.confidence, 0.5);
        assert_eq!(second.retry_count, 1);
        assert_eq!(second.message, "second");
        assert_eq!(second.additional_context.get("sql"), Some(&json!("SELECT 1")));
        assert_eq!(first.retry_count, 0);
    }

    #[test]
    fn test_serializes_category_as_snake_case() {
        let ctx = ErrorContext::new("s1", "x", ErrorCategory::ContextLength, "m");
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["category"], json!("context_length"));
        assert_eq!(value["severity"], json!("medium"));
    }
}
