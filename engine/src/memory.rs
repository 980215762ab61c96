//! In-memory source and sink.
//!
//! Used by the test suite and the benchmarks, and handy for dry runs: the
//! source is an append-only vector, the sink records every attempt and can be
//! scripted to fail on chosen rows.

use crate::{RawRow, RowIndex, SinkAck, SinkError, SinkWriter, SourceError, SourceHandle};
use crate::{SourceReader, SyncRecord};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Append-only in-memory table.
#[derive(Debug, Default)]
pub struct MemorySource {
    rows: Mutex<Vec<RawRow>>,
    outages: Mutex<VecDeque<String>>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row.
    pub fn append<I, S>(&self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.rows).push(RawRow::new(cells));
    }

    /// Replace the whole table. Lets tests simulate a truncated sheet.
    pub fn replace(&self, rows: Vec<RawRow>) {
        *lock(&self.rows) = rows;
    }

    /// Make the next fetch fail as unavailable.
    pub fn fail_next(&self, reason: impl Into<String>) {
        lock(&self.outages).push_back(reason.into());
    }

    /// Number of fetches attempted so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch(&self, _handle: &SourceHandle) -> Result<Vec<RawRow>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = lock(&self.outages).pop_front() {
            return Err(SourceError::Unavailable(reason));
        }
        Ok(lock(&self.rows).clone())
    }
}

/// Recording sink with scripted failures.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<SyncRecord>>,
    attempts: Mutex<Vec<RowIndex>>,
    rejected: Mutex<HashMap<RowIndex, String>>,
    outages: Mutex<HashMap<RowIndex, VecDeque<String>>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always reject the row at `index`.
    pub fn reject(&self, index: RowIndex, reason: impl Into<String>) {
        lock(&self.rejected).insert(index, reason.into());
    }

    /// Fail the next write of the row at `index` as unavailable.
    pub fn fail_once(&self, index: RowIndex, reason: impl Into<String>) {
        lock(&self.outages)
            .entry(index)
            .or_default()
            .push_back(reason.into());
    }

    /// Sleep this long inside every write.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Records durably stored, in delivery order.
    pub fn delivered(&self) -> Vec<SyncRecord> {
        lock(&self.delivered).clone()
    }

    /// Source indices of delivered records, in delivery order.
    pub fn delivered_indices(&self) -> Vec<RowIndex> {
        lock(&self.delivered)
            .iter()
            .map(|r| r.source_index)
            .collect()
    }

    /// Source indices of every write attempt, including failed ones.
    pub fn attempts(&self) -> Vec<RowIndex> {
        lock(&self.attempts).clone()
    }

    /// Highest number of writes ever observed running at once.
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.delivered).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SinkWriter for MemorySink {
    async fn write(&self, record: &SyncRecord) -> Result<SinkAck, SinkError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let index = record.source_index;
        lock(&self.attempts).push(index);

        let outcome = if let Some(reason) = lock(&self.rejected).get(&index) {
            Err(SinkError::Rejected(reason.clone()))
        } else if let Some(reason) = lock(&self.outages)
            .get_mut(&index)
            .and_then(VecDeque::pop_front)
        {
            Err(SinkError::Unavailable(reason))
        } else {
            lock(&self.delivered).push(record.clone());
            Ok(SinkAck::new(format!("mem-{}", index)))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
