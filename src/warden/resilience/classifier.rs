// SPDX-License-Identifier: MIT

//! Pattern-based failure classification
//!
//! The rule table is ordered data. Every rule whose pattern matches the
//! failure message scores by how specific the pattern is; the best score
//! wins and ties go to the category registered first.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::category::ErrorCategory;
use crate::base::error::WardenError;

/// A single (category, pattern) entry, as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub category: ErrorCategory,
    pub pattern: String,
}

const DEFAULT_RULES: &[(ErrorCategory, &str)] = &[
    (ErrorCategory::Quota, r"quota.*exceeded"),
    (ErrorCategory::Quota, r"rate limit.*exceeded"),
    (ErrorCategory::Quota, r"too many requests"),
    (ErrorCategory::Syntax, r"syntax error"),
    (ErrorCategory::Syntax, r"invalid.*query"),
    (ErrorCategory::Syntax, r"unrecognized name"),
    (ErrorCategory::Syntax, r"table.*not found"),
    (ErrorCategory::Permission, r"permission denied"),
    (ErrorCategory::Permission, r"access denied"),
    (ErrorCategory::Permission, r"forbidden"),
    (ErrorCategory::Permission, r"unauthorized"),
    (ErrorCategory::Timeout, r"timeout"),
    (ErrorCategory::Timeout, r"request.*timed out"),
    (ErrorCategory::Timeout, r"connection.*timeout"),
    (ErrorCategory::Quota, r"rate limit"),
    (ErrorCategory::Quota, r"too many tokens"),
    (ErrorCategory::ContextLength, r"context.*too long"),
    (ErrorCategory::ContextLength, r"maximum.*length.*exceeded"),
    (ErrorCategory::ContextLength, r"token limit.*exceeded"),
    (ErrorCategory::OversizedResult, r"dataset.*too large"),
    (ErrorCategory::OversizedResult, r"exceeds.*limit"),
    (ErrorCategory::OversizedResult, r"memory.*error"),
    (ErrorCategory::EmptyResult, r"no.*data.*returned"),
    (ErrorCategory::EmptyResult, r"empty.*result"),
    (ErrorCategory::EmptyResult, r"zero.*rows"),
];

static DEFAULT_CLASSIFIER: Lazy<ErrorClassifier> = Lazy::new(|| {
    let rules = DEFAULT_RULES
        .iter()
        .filter_map(|(category, pattern)| CompiledRule::new(*category, pattern).ok())
        .collect();
    ErrorClassifier { rules }
});

#[derive(Debug, Clone)]
struct CompiledRule {
    category: ErrorCategory,
    regex: Regex,
    score: f64,
}

impl CompiledRule {
    fn new(category: ErrorCategory, pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            category,
            regex,
            score: specificity(pattern),
        })
    }
}

/// Longer patterns are more specific and more trustworthy
fn specificity(pattern: &str) -> f64 {
    let len = pattern.chars().count();
    if len > 20 {
        0.9
    } else if len > 10 {
        0.7
    } else {
        0.5
    }
}

/// Maps failure messages to an [`ErrorCategory`] with a confidence score
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<CompiledRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        DEFAULT_CLASSIFIER.clone()
    }
}

impl ErrorClassifier {
    /// The built-in table followed by `extra` rules
    pub fn with_rules(extra: &[RuleSpec]) -> Result<Self, WardenError> {
        let mut classifier = Self::default();
        for spec in extra {
            let rule = CompiledRule::new(spec.category, &spec.pattern).map_err(|e| {
                WardenError::config(format!(
                    "invalid classifier pattern '{}': {}",
                    spec.pattern, e
                ))
            })?;
            classifier.rules.push(rule);
        }
        Ok(classifier)
    }

    /// Classify a message; never fails.
    ///
    /// Returns `(Unclassified, 0.5)` when nothing matches.
    pub fn classify(&self, message: &str) -> (ErrorCategory, f64) {
        let mut best: Option<(ErrorCategory, f64)> = None;

        for rule in &self.rules {
            if !rule.regex.is_match(message) {
                continue;
            }
            // Strictly greater: an equal score never displaces an earlier rule
            if best.map_or(true, |(_, score)| rule.score > score) {
                best = Some((rule.category, rule.score));
            }
        }

        best.unwrap_or((ErrorCategory::Unclassified, 0.5))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_known_messages() {
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("Permission denied on dataset sales"),
            (ErrorCategory::Permission, 0.7)
        );
        assert_eq!(
            classifier.classify("Query timeout while waiting for job"),
            (ErrorCategory::Timeout, 0.5)
        );
        assert_eq!(
            classifier.classify("Syntax error: Unexpected keyword FROM at [1:8]"),
            (ErrorCategory::Syntax, 0.7)
        );
        assert_eq!(
            classifier.classify("No data returned for the given filters"),
            (ErrorCategory::EmptyResult, 0.7)
        );
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("ACCESS DENIED").0,
            ErrorCategory::Permission
        );
    }

    #[test]
    fn test_unmatched_is_unclassified() {
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("the flux capacitor is misaligned"),
            (ErrorCategory::Unclassified, 0.5)
        );
        assert_eq!(classifier.classify(""), (ErrorCategory::Unclassified, 0.5));
    }

    #[test]
    fn test_more_specific_pattern_wins() {
        // "exceeds.*limit" (14 chars) and "maximum.*length.*exceeded" (25 chars)
        // both match; the longer one scores higher.
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("maximum context length exceeded, input exceeds the limit"),
            (ErrorCategory::ContextLength, 0.9)
        );
    }

    #[test]
    fn test_ties_go_to_first_registered() {
        // "quota.*exceeded" registers for quota before "exceeds.*limit" for
        // oversized results; both are 0.7.
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("quota exceeded: request exceeds daily limit"),
            (ErrorCategory::Quota, 0.7)
        );
    }

    #[test]
    fn test_extra_rules_are_appended() {
        let classifier = ErrorClassifier::with_rules(&[RuleSpec {
            category: ErrorCategory::InvalidQuestion,
            pattern: "question is ambiguous".to_string(),
        }])
        .unwrap();
        assert_eq!(classifier.rule_count(), DEFAULT_RULES.len() + 1);
        assert_eq!(
            classifier.classify("The question is ambiguous"),
            (ErrorCategory::InvalidQuestion, 0.9)
        );
    }

    #[test]
    fn test_invalid_extra_rule_is_config_error() {
        let err = ErrorClassifier::with_rules(&[RuleSpec {
            category: ErrorCategory::Quota,
            pattern: "(unclosed".to_string(),
        }])
        .unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));
    }
}
