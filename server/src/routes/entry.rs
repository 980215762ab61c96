//! Form submission route.

use axum::{extract::State, routing::post, Json, Router};

use crate::auth::GoogleAuth;
use crate::error::Result;
use crate::handlers::{handle_add_entry, EntryForm, EntryResponse};
use crate::AppState;

/// Create entry routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/add-entry", post(add_entry_handler))
}

/// POST /add-entry - Record a form submission and start syncing its sheet.
async fn add_entry_handler(
    State(state): State<AppState>,
    GoogleAuth(token): GoogleAuth,
    Json(form): Json<EntryForm>,
) -> Result<Json<EntryResponse>> {
    let response = handle_add_entry(&state, &token, form).await?;
    Ok(Json(response))
}
