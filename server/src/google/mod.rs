//! Google Sheets and Calendar client.
//!
//! Authentication is delegated: an OAuth token obtained elsewhere is read
//! from a JSON file on every use, so a refreshed token is picked up without
//! a restart.

mod calendar;
mod sheets;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;

pub use calendar::CalendarEvent;

/// Stored OAuth token, as written by the Google OAuth callback.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry in milliseconds since epoch
    #[serde(default)]
    pub expiry_date: Option<i64>,
}

/// Google API errors.
#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("no usable Google token at {path}: {reason}")]
    Token { path: String, reason: String },

    #[error("invalid Google API url: {0}")]
    Url(String),

    #[error("Google API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Read the token file.
pub async fn load_token(path: &Path) -> Result<GoogleToken, GoogleError> {
    let token_error = |reason: String| GoogleError::Token {
        path: path.display().to_string(),
        reason,
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| token_error(e.to_string()))?;
    let token: GoogleToken =
        serde_json::from_str(&raw).map_err(|e| token_error(e.to_string()))?;

    if token.access_token.trim().is_empty() {
        return Err(token_error("access_token is empty".into()));
    }
    Ok(token)
}

/// Client for the Sheets v4 and Calendar v3 REST APIs.
#[derive(Debug, Clone)]
pub struct GoogleClient {
    http: Client,
    sheets_base: Url,
    calendar_base: Url,
    token_path: PathBuf,
}

impl GoogleClient {
    pub fn new(
        sheets_base_url: &str,
        calendar_base_url: &str,
        token_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, GoogleError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            sheets_base: parse_base(sheets_base_url)?,
            calendar_base: parse_base(calendar_base_url)?,
            token_path: token_path.into(),
        })
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Read the current token from disk.
    pub async fn token(&self) -> Result<GoogleToken, GoogleError> {
        load_token(&self.token_path).await
    }

    fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, GoogleError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| GoogleError::Url(base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn parse_base(url: &str) -> Result<Url, GoogleError> {
    Url::parse(url).map_err(|e| GoogleError::Url(format!("{}: {}", url, e)))
}

/// Turn a non-success response into a status error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GoogleError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GoogleError::Status {
        status: status.as_u16(),
        body,
    })
}
