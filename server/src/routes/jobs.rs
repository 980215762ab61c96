//! Sync job routes.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use sheetsync_engine::SyncStatus;

use crate::error::Result;
use crate::handlers::{handle_get_job, handle_list_jobs};
use crate::AppState;

/// Create sync job routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/jobs", get(list_jobs_handler))
        .route("/sync/jobs/{job_id}", get(get_job_handler))
}

/// GET /sync/jobs - Status of every job.
async fn list_jobs_handler(State(state): State<AppState>) -> Json<Vec<SyncStatus>> {
    Json(handle_list_jobs(&state.registry).await)
}

/// GET /sync/jobs/{job_id} - Status of one job.
async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<SyncStatus>> {
    let status = handle_get_job(&state.registry, &job_id).await?;
    Ok(Json(status))
}
