// SPDX-License-Identifier: MIT

//! What a run or resume returns

use serde::{Deserialize, Serialize};

use crate::warden::resilience::{ErrorContext, TranslatedError};
use crate::warden::workflow::state::WorkflowState;
use crate::warden::workflow::step::SuspensionPayload;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Reached a node with no matching successor, or `END`
    Completed(Completion),
    /// Waiting for an external decision; a checkpoint has been saved
    Suspended(Suspension),
    /// Halted on a failure the executor gave up on
    Failed(Box<Failure>),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }

    pub fn thread_id(&self) -> &str {
        match self {
            RunOutcome::Completed(c) => &c.thread_id,
            RunOutcome::Suspended(s) => &s.thread_id,
            RunOutcome::Failed(f) => &f.thread_id,
        }
    }

    /// Final state for terminal outcomes
    pub fn state(&self) -> Option<&WorkflowState> {
        match self {
            RunOutcome::Completed(c) => Some(&c.state),
            RunOutcome::Failed(f) => Some(&f.state),
            RunOutcome::Suspended(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            RunOutcome::Failed(f) => Some(f),
            _ => None,
        }
    }

    pub fn suspension(&self) -> Option<&Suspension> {
        match self {
            RunOutcome::Suspended(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub thread_id: String,
    pub state: WorkflowState,
    /// Node ids in the order they ran during this call
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    pub thread_id: String,
    pub pending_node: String,
    pub payload: SuspensionPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    CircuitOpen,
    NonRetryable,
    RetriesExhausted,
    RetryBudgetExhausted,
    RecoveryDeclined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub thread_id: String,
    /// Node whose failure halted the run
    pub node: String,
    pub reason: HaltReason,
    /// User-facing translation
    pub error: TranslatedError,
    /// Full technical record
    pub context: ErrorContext,
    /// State after the error node (if any) ran
    pub state: WorkflowState,
    pub path: Vec<String>,
}
