// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{CheckpointRecord, CheckpointStore};
use crate::base::error::CheckpointError;

/// One JSON document per thread under a directory.
///
/// Thread ids are percent-encoded into file names, so any non-blank id is
/// accepted and `list` hands back the id as it was given. Writes go to a temporary file that is renamed over the target, so a crash
/// mid-write leaves the previous checkpoint intact.
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        self.validate_thread_id(thread_id)?;
        Ok(self
            .dir
            .join(format!("{}.json", urlencoding::encode(thread_id))))
    }

    /// Drop the per-thread lock unless a writer other than `held` still has it
    fn release_lock(&self, thread_id: &str, held: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        let idle = locks
            .get(thread_id)
            .map_or(false, |entry| Arc::ptr_eq(entry, held) && Arc::strong_count(entry) == 2);
        if idle {
            locks.remove(thread_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    fn lock_for(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.locks.lock() {
            Ok(mut locks) => locks.entry(thread_id.to_string()).or_default().clone(),
            Err(poisoned) => poisoned
                .into_inner()
                .entry(thread_id.to_string())
                .or_default()
                .clone(),
        }
    }
}

fn storage(e: impl std::fmt::Display) -> CheckpointError {
    CheckpointError::Storage(e.to_string())
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, record: CheckpointRecord) -> Result<(), CheckpointError> {
        let path = self.path_for(&record.thread_id)?;
        let body = serde_json::to_string_pretty(&record).map_err(storage)?;

        let lock = self.lock_for(&record.thread_id);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await.map_err(storage)?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, body).await.map_err(storage)?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(storage(e));
        }
        log::debug!("Checkpoint for '{}' written to {}", record.thread_id, path.display());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<CheckpointRecord, CheckpointError> {
        let path = self.path_for(thread_id)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(thread_id.to_string()))
            }
            Err(e) => return Err(storage(e)),
        };
        serde_json::from_str(&text).map_err(|e| CheckpointError::Corrupt {
            thread_id: thread_id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(thread_id)?;
        let lock = self.lock_for(thread_id);
        let removed = {
            let _guard = lock.lock().await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(storage(e)),
            }
        };
        self.release_lock(thread_id, &lock);
        removed
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(storage)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match urlencoding::decode(stem) {
                Ok(id) => ids.push(id.into_owned()),
                Err(e) => log::warn!("Skipping checkpoint file {}: {}", path.display(), e),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
