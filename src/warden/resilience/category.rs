// SPDX-License-Identifier: MIT

//! Failure categories and their default severities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of failure a step raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Quota,
    Syntax,
    Permission,
    Timeout,
    ContextLength,
    OversizedResult,
    EmptyResult,
    InvalidQuestion,
    Unclassified,
    /// Synthesized by the executor when a breaker refuses the call
    CircuitOpen,
}

/// How bad a failure is for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 10] = [
        ErrorCategory::Quota,
        ErrorCategory::Syntax,
        ErrorCategory::Permission,
        ErrorCategory::Timeout,
        ErrorCategory::ContextLength,
        ErrorCategory::OversizedResult,
        ErrorCategory::EmptyResult,
        ErrorCategory::InvalidQuestion,
        ErrorCategory::Unclassified,
        ErrorCategory::CircuitOpen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Quota => "quota",
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ContextLength => "context_length",
            ErrorCategory::OversizedResult => "oversized_result",
            ErrorCategory::EmptyResult => "empty_result",
            ErrorCategory::InvalidQuestion => "invalid_question",
            ErrorCategory::Unclassified => "unclassified",
            ErrorCategory::CircuitOpen => "circuit_open",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorCategory::Syntax
            | ErrorCategory::Permission
            | ErrorCategory::InvalidQuestion
            | ErrorCategory::CircuitOpen => Severity::High,
            ErrorCategory::EmptyResult => Severity::Low,
            ErrorCategory::Quota
            | ErrorCategory::Timeout
            | ErrorCategory::ContextLength
            | ErrorCategory::OversizedResult
            | ErrorCategory::Unclassified => Severity::Medium,
        }
    }

    /// Whether re-invoking the same step can ever help
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ErrorCategory::Syntax
                | ErrorCategory::Permission
                | ErrorCategory::InvalidQuestion
                | ErrorCategory::EmptyResult
                | ErrorCategory::CircuitOpen
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown error category '{}'", s))
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
