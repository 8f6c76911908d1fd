// SPDX-License-Identifier: MIT

//! Suspension checkpoints keyed by thread id
//!
//! A checkpoint is written whenever a step suspends and holds exactly what
//! is needed to continue later: the serialized state, the node that
//! suspended, and the payload shown to the reviewer. Nothing expires on its
//! own; an abandoned session simply never resumes.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::base::error::CheckpointError;
use crate::warden::workflow::state::WorkflowState;
use crate::warden::workflow::step::SuspensionPayload;

/// Reserved state field that carries the reviewer's decision into the graph
pub const RESUME_FIELD: &str = "resume";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub thread_id: String,
    /// State as the exact JSON text it was saved with
    pub state: String,
    pub pending_node: String,
    pub payload: SuspensionPayload,
    pub created_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(
        thread_id: impl Into<String>,
        state: &WorkflowState,
        pending_node: impl Into<String>,
        payload: SuspensionPayload,
    ) -> Result<Self, CheckpointError> {
        let thread_id = thread_id.into();
        let state = serde_json::to_string(state).map_err(|e| CheckpointError::Corrupt {
            thread_id: thread_id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            thread_id,
            state,
            pending_node: pending_node.into(),
            payload,
            created_at: Utc::now(),
        })
    }

    /// Deserialize the saved state
    pub fn restore_state(&self) -> Result<WorkflowState, CheckpointError> {
        serde_json::from_str(&self.state).map_err(|e| CheckpointError::Corrupt {
            thread_id: self.thread_id.clone(),
            reason: e.to_string(),
        })
    }

    /// Merge a reviewer decision into the restored state.
    ///
    /// A decision that is not one of the offered options is replaced by the
    /// first option.
    pub fn resume_with(&self, input: ResumeInput) -> Result<ResumedThread, CheckpointError> {
        let mut state = self.restore_state()?;

        let decision = if self.payload.options.is_empty() || self.payload.offers(&input.decision)
        {
            input.decision
        } else {
            let fallback = self
                .payload
                .default_option()
                .map(|o| o.id.clone())
                .unwrap_or_default();
            log::warn!(
                "Thread '{}': unrecognized decision '{}', defaulting to '{}'",
                self.thread_id,
                input.decision,
                fallback
            );
            fallback
        };

        state.update(
            RESUME_FIELD,
            json!({"decision": decision, "payload": input.payload}),
        );

        Ok(ResumedThread {
            state,
            pending_node: self.pending_node.clone(),
            decision,
        })
    }
}

/// External input that continues a suspended thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeInput {
    pub decision: String,
    #[serde(default)]
    pub payload: Value,
}

impl ResumeInput {
    pub fn new(decision: impl Into<String>) -> Self {
        Self {
            decision: decision.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumedThread {
    pub state: WorkflowState,
    pub pending_node: String,
    /// The decision after normalization
    pub decision: String,
}

/// Persistence for suspended threads.
///
/// Writes for one thread are serialized; different threads may be written
/// concurrently.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Checked before a thread runs, so an id the store cannot key on fails
    /// ahead of any step
    fn validate_thread_id(&self, thread_id: &str) -> Result<(), CheckpointError> {
        if thread_id.trim().is_empty() {
            return Err(CheckpointError::InvalidThreadId(thread_id.to_string()));
        }
        Ok(())
    }

    async fn save(&self, record: CheckpointRecord) -> Result<(), CheckpointError>;

    async fn load(&self, thread_id: &str) -> Result<CheckpointRecord, CheckpointError>;

    /// Removing an absent checkpoint is not an error
    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError>;

    /// Thread ids with an outstanding checkpoint, sorted
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;

    /// Load the checkpoint and merge `input` into its state
    async fn resume(
        &self,
        thread_id: &str,
        input: ResumeInput,
    ) -> Result<ResumedThread, CheckpointError> {
        self.load(thread_id).await?.resume_with(input)
    }
}
