//! Sink side of the synchronizer.

use crate::SyncRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Acknowledgement of a durable write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkAck {
    /// Identifier assigned by the sink, when it reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl SinkAck {
    pub fn new(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
        }
    }
}

/// Failure writing to the sink.
///
/// The variant decides what the engine does with the row: a rejected row is
/// skipped for good, an unavailable sink leaves the row to be retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The record is malformed for the sink; retrying will never succeed.
    #[error("sink rejected record: {0}")]
    Rejected(String),

    /// Network failure, rate limit or outage; a later retry may succeed.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Unavailable(_))
    }
}

/// Durably stores one transformed record.
///
/// Redelivery of a record is possible (at-least-once); sinks that can dedupe
/// should do so on [`SyncRecord::idempotency_key`].
#[async_trait]
pub trait SinkWriter: Send + Sync {
    async fn write(&self, record: &SyncRecord) -> Result<SinkAck, SinkError>;
}
