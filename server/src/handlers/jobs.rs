//! Sync job inspection.

use sheetsync_engine::SyncStatus;

use crate::error::{AppError, Result};
use crate::sync::JobRegistry;

/// Status of every running job.
pub async fn handle_list_jobs(registry: &JobRegistry) -> Vec<SyncStatus> {
    registry.statuses().await
}

/// Status of one job, by spreadsheet id.
pub async fn handle_get_job(registry: &JobRegistry, job_id: &str) -> Result<SyncStatus> {
    let engine = registry
        .get(job_id)
        .ok_or_else(|| AppError::NotFound(format!("sync job '{}'", job_id)))?;
    Ok(engine.status().await)
}
