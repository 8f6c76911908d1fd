// SPDX-License-Identifier: MIT

//! State management for step graphs
//!
//! This module provides:
//! - `StateSchema` - defines the shape and reducers of workflow state
//! - `WorkflowState` - runtime state storage with reducer support
//! - `StatePatch` - the partial update a step hands back

mod patch;
mod schema;
mod store;

pub use patch::StatePatch;
pub use schema::{FieldKind, FieldSpec, Reducer, StateSchema};
pub use store::WorkflowState;
