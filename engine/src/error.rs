//! Error types for the SheetSync engine.

use crate::{JobId, RowIndex};
use thiserror::Error;

/// All possible errors from the SheetSync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Collaborator failures
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("sink rejected row {index}: {reason}")]
    SinkRejected { index: RowIndex, reason: String },

    #[error("sink unavailable at row {index}: {reason}")]
    SinkUnavailable { index: RowIndex, reason: String },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    // Schema errors
    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    // Configuration errors
    #[error("invalid source handle: {0}")]
    InvalidHandle(String),

    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    #[error("sync job stopped: {0}")]
    Stopped(JobId),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
