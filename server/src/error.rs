//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Sync error: {0}")]
    Sync(#[from] sheetsync_engine::Error),

    /// Form validation failures, one message per failed rule.
    #[error("Invalid request: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Please login to Google for access")]
    Unauthorized { login_url: Option<String> },

    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details, url): (
            StatusCode,
            serde_json::Value,
            Option<String>,
            Option<String>,
        ) = match &self {
            AppError::Sync(e) => {
                tracing::warn!("Sync error: {:?}", e);
                let status = match e {
                    sheetsync_engine::Error::InvalidHandle(_)
                    | sheetsync_engine::Error::InvalidCheckpoint(_) => StatusCode::BAD_REQUEST,
                    sheetsync_engine::Error::Stopped(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string().into(), None, None)
            }
            AppError::Validation(messages) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!(messages),
                None,
                None,
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone().into(), None, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone().into(), None, None),
            AppError::Unauthorized { login_url } => (
                StatusCode::UNAUTHORIZED,
                self.to_string().into(),
                None,
                login_url.clone(),
            ),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service error".into(),
                    Some(msg.clone()),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error,
            details,
            url,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
