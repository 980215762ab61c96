//! Database operations for the sync_jobs table.

use async_trait::async_trait;
use sheetsync_engine::{
    CheckpointError, CheckpointStore, JobCheckpoint, SourceHandle, CHECKPOINT_FORMAT_VERSION,
};
use sqlx::{PgPool, Row};

/// A stored sync job row from the database.
#[derive(Debug)]
pub struct StoredJob {
    pub job_id: String,
    pub spreadsheet_id: String,
    pub sheet_range: String,
    pub watermark: i64,
    pub format_version: i32,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredJob {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredJob {
            job_id: row.try_get("job_id")?,
            spreadsheet_id: row.try_get("spreadsheet_id")?,
            sheet_range: row.try_get("sheet_range")?,
            watermark: row.try_get("watermark")?,
            format_version: row.try_get("format_version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredJob {
    /// Convert database row to an engine checkpoint.
    ///
    /// Rows written by a newer format, or with a negative version, are refused.
    pub fn to_checkpoint(&self) -> Result<JobCheckpoint, String> {
        let format_version = u32::try_from(self.format_version)
            .ok()
            .filter(|version| *version <= CHECKPOINT_FORMAT_VERSION)
            .ok_or_else(|| {
                format!(
                    "job {}: unsupported checkpoint format version {} (max supported: {})",
                    self.job_id, self.format_version, CHECKPOINT_FORMAT_VERSION
                )
            })?;
        let handle = SourceHandle::new(&self.spreadsheet_id, &self.sheet_range)
            .map_err(|e| format!("job {}: {}", self.job_id, e))?;
        let watermark = u64::try_from(self.watermark)
            .map_err(|_| format!("job {}: negative watermark {}", self.job_id, self.watermark))?;

        Ok(JobCheckpoint {
            format_version,
            job_id: self.job_id.clone(),
            handle,
            watermark,
            updated_at: self.updated_at,
        })
    }
}

/// Upsert a checkpoint. The stored watermark never decreases.
pub async fn upsert_checkpoint(pool: &PgPool, checkpoint: &JobCheckpoint) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_jobs (
            job_id, spreadsheet_id, sheet_range, watermark, format_version, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (job_id) DO UPDATE SET
            spreadsheet_id = EXCLUDED.spreadsheet_id,
            sheet_range = EXCLUDED.sheet_range,
            watermark = GREATEST(sync_jobs.watermark, EXCLUDED.watermark),
            format_version = EXCLUDED.format_version,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&checkpoint.job_id)
    .bind(&checkpoint.handle.spreadsheet_id)
    .bind(&checkpoint.handle.range)
    .bind(checkpoint.watermark as i64)
    .bind(checkpoint.format_version as i32)
    .bind(checkpoint.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a sync job by ID.
pub async fn get_job(pool: &PgPool, job_id: &str) -> Result<Option<StoredJob>, sqlx::Error> {
    sqlx::query_as::<_, StoredJob>(
        r#"
        SELECT job_id, spreadsheet_id, sheet_range, watermark, format_version, updated_at
        FROM sync_jobs
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await
}

/// Get all sync jobs.
pub async fn get_all_jobs(pool: &PgPool) -> Result<Vec<StoredJob>, sqlx::Error> {
    sqlx::query_as::<_, StoredJob>(
        r#"
        SELECT job_id, spreadsheet_id, sheet_range, watermark, format_version, updated_at
        FROM sync_jobs
        ORDER BY job_id ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Checkpoint store backed by the sync_jobs table.
#[derive(Debug, Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_error(e: sqlx::Error) -> CheckpointError {
    CheckpointError(e.to_string())
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn save(&self, checkpoint: &JobCheckpoint) -> Result<(), CheckpointError> {
        upsert_checkpoint(&self.pool, checkpoint)
            .await
            .map_err(storage_error)
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobCheckpoint>, CheckpointError> {
        match get_job(&self.pool, job_id).await.map_err(storage_error)? {
            Some(stored) => stored.to_checkpoint().map(Some).map_err(CheckpointError),
            None => Ok(None),
        }
    }

    async fn load_all(&self) -> Result<Vec<JobCheckpoint>, CheckpointError> {
        let stored = get_all_jobs(&self.pool).await.map_err(storage_error)?;

        let mut checkpoints = Vec::with_capacity(stored.len());
        for job in &stored {
            match job.to_checkpoint() {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => {
                    tracing::warn!("Skipping unreadable sync job: {}", e);
                }
            }
        }
        Ok(checkpoints)
    }
}
