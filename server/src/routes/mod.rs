//! HTTP route definitions.

mod entry;
mod health;
mod jobs;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(entry::routes())
        .merge(jobs::routes())
}
