//! Google authorization extractor.
//!
//! The OAuth exchange happens outside this server; a request is authorized
//! when a usable token file is present.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::google::GoogleToken;
use crate::AppState;

/// Stored Google token, loaded for the current request.
#[derive(Debug, Clone)]
pub struct GoogleAuth(pub GoogleToken);

impl FromRequestParts<AppState> for GoogleAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.google.token().await {
            Ok(token) => Ok(GoogleAuth(token)),
            Err(e) => {
                tracing::info!("Please login to Google for access: {}", e);
                Err(AppError::Unauthorized {
                    login_url: state.config.google_login_url.clone(),
                })
            }
        }
    }
}
