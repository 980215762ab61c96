//! Sheets v4: reading a range and appending a row.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sheetsync_engine::{RawRow, SourceError, SourceHandle, SourceReader};

use super::{check_status, GoogleClient, GoogleError, GoogleToken};

/// Response of `spreadsheets.values.get`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    /// Absent when the range holds no data
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Render a cell the way the sheet displays it.
fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl GoogleClient {
    /// Read every row of a range, in sheet order.
    ///
    /// Values come back unformatted: date cells arrive as serial numbers
    /// whatever their display format, and text written with `RAW` stays text.
    pub async fn get_values(
        &self,
        token: &GoogleToken,
        handle: &SourceHandle,
    ) -> Result<Vec<RawRow>, GoogleError> {
        let url = Self::endpoint(
            &self.sheets_base,
            &[
                "v4",
                "spreadsheets",
                &handle.spreadsheet_id,
                "values",
                &handle.range,
            ],
        )?;

        let response = self
            .http
            .get(url)
            .bearer_auth(&token.access_token)
            .query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("dateTimeRenderOption", "SERIAL_NUMBER"),
            ])
            .send()
            .await?;

        let range: ValueRange = check_status(response).await?.json().await?;

        Ok(range
            .values
            .into_iter()
            .map(|row| RawRow(row.into_iter().map(cell_to_string).collect()))
            .collect())
    }

    /// Append one row after the last row of the range's table.
    pub async fn append_row(
        &self,
        token: &GoogleToken,
        handle: &SourceHandle,
        cells: &[String],
    ) -> Result<(), GoogleError> {
        let append_segment = format!("{}:append", handle.range);
        let url = Self::endpoint(
            &self.sheets_base,
            &[
                "v4",
                "spreadsheets",
                &handle.spreadsheet_id,
                "values",
                &append_segment,
            ],
        )?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&token.access_token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [cells] }))
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SourceReader for GoogleClient {
    async fn fetch(&self, handle: &SourceHandle) -> Result<Vec<RawRow>, SourceError> {
        let token = self
            .token()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        self.get_values(&token, handle)
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))
    }
}
