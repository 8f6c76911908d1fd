// SPDX-License-Identifier: MIT

//! Typed error handling for warden-rs
//!
//! Orchestration failures (bad graphs, lost checkpoints, busy sessions) are
//! reported through [`WardenError`]. Failures raised *by* step functions are
//! not crate errors: they travel as `StepError` values through the
//! classification and recovery pipeline instead.

use thiserror::Error;

/// Top-level error type for warden-rs
#[derive(Debug, Error)]
pub enum WardenError {
    /// Graph construction or traversal errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Checkpoint persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Edge condition could not be parsed
    #[error("Condition error: {0}")]
    Condition(#[from] ConditionError),

    /// Another run or resume is already advancing this thread
    #[error("Session '{0}' already has an active execution")]
    SessionBusy(String),

    /// Configuration errors (invalid values, unreadable files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while building or walking a step graph
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("Node '{0}' is registered twice")]
    DuplicateNode(String),

    #[error("Graph has no entry node")]
    MissingEntry,

    #[error("Step '{0}' is not registered")]
    UnknownStep(String),

    /// Node has outgoing edges but none of their guards matched
    #[error("No outgoing edge of '{0}' matched the current state")]
    NoRoute(String),

    #[error("Execution exceeded {0} node invocations")]
    StepLimit(u32),
}

/// Checkpoint store failures
#[derive(Debug, Error, PartialEq)]
pub enum CheckpointError {
    /// No checkpoint for this thread (never saved, deleted, or storage lost).
    /// Resuming from it is fatal and never retried.
    #[error("No checkpoint found for thread '{0}'")]
    NotFound(String),

    #[error("Checkpoint for thread '{thread_id}' is unreadable: {reason}")]
    Corrupt { thread_id: String, reason: String },

    #[error("Checkpoint storage failure: {0}")]
    Storage(String),

    #[error("Thread id '{0}' cannot be checkpointed")]
    InvalidThreadId(String),
}

/// Condition expression parse errors
#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("Expected {expected} but found {found}")]
    Unexpected { expected: String, found: String },

    #[error("Empty condition")]
    Empty,
}

impl WardenError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when the error means a resume can never succeed for this thread
    pub fn is_fatal_resume(&self) -> bool {
        matches!(
            self,
            WardenError::Checkpoint(CheckpointError::NotFound(_))
                | WardenError::Checkpoint(CheckpointError::Corrupt { .. })
                | WardenError::Checkpoint(CheckpointError::InvalidThreadId(_))
        )
    }
}
