//! Source side of the synchronizer.

use crate::{error::Result, Error, RawRow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies the watched source range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHandle {
    /// Opaque locator of the spreadsheet
    pub spreadsheet_id: String,
    /// Sub-range selector, e.g. `Data!A2:D`
    pub range: String,
}

impl SourceHandle {
    /// Create a handle; both parts must be non-empty.
    pub fn new(spreadsheet_id: impl Into<String>, range: impl Into<String>) -> Result<Self> {
        let spreadsheet_id = spreadsheet_id.into();
        let range = range.into();

        if spreadsheet_id.trim().is_empty() {
            return Err(Error::InvalidHandle("spreadsheet id is empty".into()));
        }
        if range.trim().is_empty() {
            return Err(Error::InvalidHandle("range is empty".into()));
        }

        Ok(Self {
            spreadsheet_id,
            range,
        })
    }
}

impl std::fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.spreadsheet_id, self.range)
    }
}

/// Failure reading the source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Network or authentication failure; the next poll retries.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Reads the full current contents of a source range.
///
/// Implementations must preserve the source's native row order and must not
/// reorder or deduplicate. An empty range is `Ok(vec![])`, not an error.
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn fetch(&self, handle: &SourceHandle) -> std::result::Result<Vec<RawRow>, SourceError>;
}
