//! Form submission handling.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sheetsync_engine::{is_email, SourceHandle};

use crate::error::{AppError, Result};
use crate::google::{CalendarEvent, GoogleToken};
use crate::AppState;

/// Range used when the form does not name one.
pub const DEFAULT_RANGE: &str = "Data!A2:D";

/// Body of `POST /add-entry`.
///
/// Every field defaults so that missing fields surface as validation
/// messages rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sheet_url: String,
    #[serde(default)]
    pub range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub message: String,
}

impl EntryForm {
    /// Check every rule, collecting one message per failure.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.chars().count() < 3 {
            errors.push("Name is required".to_string());
        }
        if !is_email(&self.email) {
            errors.push("Invalid email".to_string());
        }
        if self.message.is_empty() {
            errors.push("Message is required".to_string());
        }
        if self.sheet_url.is_empty() {
            errors.push("Sheet Url is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The range to append to and sync from.
    pub fn range(&self) -> &str {
        match self.range.as_deref() {
            Some(range) if !range.trim().is_empty() => range,
            _ => DEFAULT_RANGE,
        }
    }
}

static SHEET_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/d/([a-zA-Z0-9_-]+)").expect("Invalid sheet id regex"));

/// Pull the spreadsheet id out of a Google Sheets URL: the segment after `/d/`.
pub fn extract_sheet_id(url: &str) -> Option<&str> {
    SHEET_ID_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str())
}

/// Today's date as written into the sheet.
fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Record a submission: calendar invite, sheet row, then sync job.
pub async fn handle_add_entry(
    state: &AppState,
    token: &GoogleToken,
    form: EntryForm,
) -> Result<EntryResponse> {
    form.validate().map_err(AppError::Validation)?;

    let sheet_id = extract_sheet_id(&form.sheet_url)
        .ok_or_else(|| AppError::BadRequest("Invalid Google Sheets URL".to_string()))?;
    let handle = SourceHandle::new(sheet_id, form.range())?;

    let event = CalendarEvent::invite(&form.email, &form.message, Utc::now());
    state
        .google
        .insert_event(token, &event)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let row = [
        form.name.clone(),
        form.email.clone(),
        form.message.clone(),
        today(),
    ];
    state
        .google
        .append_row(token, &handle, &row)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    tracing::info!(source = %handle, "Form entry appended");

    state.registry.configure(handle).await?;

    Ok(EntryResponse {
        message: "Data added successfully".to_string(),
    })
}
