//! # SheetSync Engine
//!
//! A polling incremental synchronizer for append-only tabular sources.
//!
//! The engine watches a spreadsheet range for growth and forwards each newly
//! observed row, in source order, to a downstream sink. It keeps a single
//! cursor per job, the [`Watermark`]: the count of source rows already
//! forwarded (or permanently skipped).
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never talks to a network or a database itself.
//!   Sources, sinks and checkpoint storage are traits supplied by the host.
//! - **Ordered**: rows are delivered one at a time, oldest first, never
//!   concurrently.
//! - **At-least-once**: a transient sink failure leaves the watermark behind
//!   the failed row so the whole unacknowledged suffix is retried.
//! - **Testable**: every collaborator can be replaced by an in-memory fake.
//!
//! ## Core Concepts
//!
//! ### Collaborators
//!
//! - [`SourceReader`] - fetches the full current contents of a range
//! - [`RowTransformer`] - maps a positional [`RawRow`] to a [`SyncRecord`]
//! - [`SinkWriter`] - durably stores one record, or fails with a typed
//!   [`SinkError`] distinguishing permanent rejection from unavailability
//! - [`CheckpointStore`] - persists the watermark of each job
//!
//! ### Poll cycles
//!
//! [`SyncEngine::tick`] runs one scheduled poll. Ticks are skipped while the
//! engine is idle, coalesced while a previous cycle is still running, and
//! deferred while a failing job is backing off.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sheetsync_engine::{
//!     CycleOutcome, FormRowTransformer, MemoryCheckpointStore, MemorySink, MemorySource,
//!     RetryPolicy, SourceHandle, SyncEngine,
//! };
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let source = Arc::new(MemorySource::new());
//! let sink = Arc::new(MemorySink::new());
//! let engine = SyncEngine::new(
//!     "sheet-1",
//!     source.clone(),
//!     Arc::new(FormRowTransformer::new()),
//!     sink.clone(),
//!     Arc::new(MemoryCheckpointStore::new()),
//!     RetryPolicy::default(),
//! );
//!
//! let handle = SourceHandle::new("sheet-1", "Data!A2:D").unwrap();
//! engine.configure(handle).await.unwrap();
//!
//! source.append(["Alice", "alice@example.com", "Hello", "2024-02-01"]);
//! let report = engine.poll_once().await;
//!
//! assert_eq!(report.outcome, CycleOutcome::Completed);
//! assert_eq!(engine.watermark().await, 1);
//! assert_eq!(sink.len(), 1);
//! # });
//! # }
//! ```

pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod memory;
pub mod row;
pub mod schema;
pub mod sink;
pub mod source;
pub mod transform;

// Re-export main types at crate root
pub use checkpoint::{
    CheckpointError, CheckpointStore, JobCheckpoint, MemoryCheckpointStore,
    CHECKPOINT_FORMAT_VERSION,
};
pub use engine::{CycleOutcome, CycleReport, EngineState, RetryPolicy, SyncEngine, SyncStatus};
pub use error::Error;
pub use memory::{MemorySink, MemorySource};
pub use row::{FieldValue, RawRow, SyncRecord};
pub use schema::{is_email, FieldDef, FieldType, RecordSchema};
pub use sink::{SinkAck, SinkError, SinkWriter};
pub use source::{SourceError, SourceHandle, SourceReader};
pub use transform::{normalize_date, FormRowTransformer, RowTransformer};

/// Type aliases for clarity
pub type JobId = String;
pub type Watermark = u64;
pub type RowIndex = u64;
