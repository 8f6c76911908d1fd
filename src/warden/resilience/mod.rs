// SPDX-License-Identifier: MIT

//! Failure handling for step execution
//!
//! A caught step failure flows through classification, the circuit breaker,
//! the retry policy and recovery, and is translated for the user only when
//! the executor gives up on it.

pub mod category;
pub mod circuit;
pub mod classifier;
pub mod context;
pub mod error_log;
pub mod recovery;
pub mod retry;
pub mod translator;

pub use category::{ErrorCategory, Severity};
pub use circuit::{BreakerSettings, CircuitBreakerRegistry, CircuitState};
pub use classifier::{ErrorClassifier, RuleSpec};
pub use context::ErrorContext;
pub use error_log::{
    ErrorAggregator, ErrorLogRecord, ErrorSink, ErrorSummary, JsonlErrorLog, MemoryErrorLog,
};
pub use recovery::{
    RecoveryDisposition, RecoveryManager, RecoveryOutcome, RecoverySettings, SAMPLE_KEY, SQL_KEY,
};
pub use retry::RetryPolicy;
pub use translator::{ErrorTranslator, TechnicalDetails, TranslatedError, UserMessage};
