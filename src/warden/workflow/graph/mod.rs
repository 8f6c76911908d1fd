// SPDX-License-Identifier: MIT

//! Step-graph execution
//!
//! Nodes bind steps, edges route on the merged state, and the executor
//! drives a thread from its entry (or a checkpoint) to completion,
//! suspension or a translated failure.

pub mod executor;
pub mod node;
pub mod outcome;
pub mod services;

pub use executor::{StateGraphExecutor, ERROR_FIELD};
pub use node::{Edge, EdgeGuard, Node, Predicate, END};
pub use outcome::{Completion, Failure, HaltReason, RunOutcome, Suspension};
pub use services::{ExecutorServices, ExecutorSettings};
