//! Checkpoints for persisting and restoring job progress.
//!
//! A checkpoint is the durable form of a job: its source handle and its
//! watermark. The engine saves one after every row it moves past, so a
//! restart resumes where forwarding left off instead of replaying the sheet.

use crate::{error::Result, Error, JobId, SourceHandle, Watermark};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Version of the checkpoint format for future compatibility.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Durable state of one sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCheckpoint {
    /// Checkpoint format version
    pub format_version: u32,
    /// Job this checkpoint belongs to
    pub job_id: JobId,
    /// Watched source range
    pub handle: SourceHandle,
    /// Rows already forwarded or permanently skipped
    pub watermark: Watermark,
    /// When the checkpoint was taken
    pub updated_at: DateTime<Utc>,
}

impl JobCheckpoint {
    /// Create a checkpoint stamped with the current time.
    pub fn new(job_id: impl Into<JobId>, handle: SourceHandle, watermark: Watermark) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            job_id: job_id.into(),
            handle,
            watermark,
            updated_at: Utc::now(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidCheckpoint(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let checkpoint: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidCheckpoint(e.to_string()))?;

        if checkpoint.format_version > CHECKPOINT_FORMAT_VERSION {
            return Err(Error::InvalidCheckpoint(format!(
                "unsupported checkpoint format version: {} (max supported: {})",
                checkpoint.format_version, CHECKPOINT_FORMAT_VERSION
            )));
        }

        Ok(checkpoint)
    }
}

/// Failure talking to checkpoint storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("checkpoint storage failed: {0}")]
pub struct CheckpointError(pub String);

/// Durable storage for job checkpoints, keyed by job id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint. Must never lower a stored watermark.
    async fn save(&self, checkpoint: &JobCheckpoint) -> std::result::Result<(), CheckpointError>;

    /// Load the checkpoint for a job, if any.
    async fn load(&self, job_id: &str)
        -> std::result::Result<Option<JobCheckpoint>, CheckpointError>;

    /// Load every stored checkpoint, ordered by job id.
    async fn load_all(&self) -> std::result::Result<Vec<JobCheckpoint>, CheckpointError>;
}

/// In-memory checkpoint store, for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<BTreeMap<JobId, JobCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a checkpoint directly, bypassing the watermark guard.
    pub fn insert(&self, checkpoint: JobCheckpoint) {
        self.lock().insert(checkpoint.job_id.clone(), checkpoint);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<JobId, JobCheckpoint>> {
        // A poisoned map is still structurally valid.
        self.checkpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &JobCheckpoint) -> std::result::Result<(), CheckpointError> {
        let mut map = self.lock();
        let watermark = map
            .get(&checkpoint.job_id)
            .map(|existing| existing.watermark.max(checkpoint.watermark))
            .unwrap_or(checkpoint.watermark);

        let mut stored = checkpoint.clone();
        stored.watermark = watermark;
        map.insert(stored.job_id.clone(), stored);
        Ok(())
    }

    async fn load(
        &self,
        job_id: &str,
    ) -> std::result::Result<Option<JobCheckpoint>, CheckpointError> {
        Ok(self.lock().get(job_id).cloned())
    }

    async fn load_all(&self) -> std::result::Result<Vec<JobCheckpoint>, CheckpointError> {
        Ok(self.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> SourceHandle {
        SourceHandle::new("sheet-1", "Data!A2:D").unwrap()
    }

    #[test]
    fn json_roundtrip() {
        let checkpoint = JobCheckpoint::new("sheet-1", handle(), 12);
        let json = checkpoint.to_json().unwrap();
        assert!(json.contains("\"watermark\":12"));

        let parsed = JobCheckpoint::from_json(&json).unwrap();
        assert_eq!(parsed, checkpoint);
    }

    #[test]
    fn rejects_future_format_version() {
        let mut checkpoint = JobCheckpoint::new("sheet-1", handle(), 0);
        checkpoint.format_version = CHECKPOINT_FORMAT_VERSION + 1;
        let json = serde_json::to_string(&checkpoint).unwrap();

        let result = JobCheckpoint::from_json(&json);
        assert!(matches!(result, Err(Error::InvalidCheckpoint(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            JobCheckpoint::from_json("{not json"),
            Err(Error::InvalidCheckpoint(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_never_lowers_watermark() {
        let store = MemoryCheckpointStore::new();
        store
            .save(&JobCheckpoint::new("sheet-1", handle(), 5))
            .await
            .unwrap();
        store
            .save(&JobCheckpoint::new("sheet-1", handle(), 3))
            .await
            .unwrap();

        let loaded = store.load("sheet-1").await.unwrap().unwrap();
        assert_eq!(loaded.watermark, 5);
    }

    #[tokio::test]
    async fn memory_store_load_all_is_ordered() {
        let store = MemoryCheckpointStore::new();
        store.insert(JobCheckpoint::new("b", handle(), 1));
        store.insert(JobCheckpoint::new("a", handle(), 2));

        let all = store.load_all().await.unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.job_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(store.load("missing").await.unwrap().is_none());
    }
}
