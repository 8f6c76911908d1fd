// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{CheckpointRecord, CheckpointStore};
use crate::base::error::CheckpointError;

/// Process-local checkpoints; lost on exit
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    records: Mutex<HashMap<String, CheckpointRecord>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, record: CheckpointRecord) -> Result<(), CheckpointError> {
        let mut records = self.records.lock().await;
        records.insert(record.thread_id.clone(), record);
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<CheckpointRecord, CheckpointError> {
        let records = self.records.lock().await;
        records
            .get(thread_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        self.records.lock().await.remove(thread_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.records.lock().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
