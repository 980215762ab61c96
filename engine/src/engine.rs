//! SyncEngine - the poll-loop orchestrator.
//!
//! One engine drives one sync job. It owns the job's watermark, polls the
//! source, forwards every row beyond the watermark to the sink in index
//! order, and advances the watermark one row at a time.
//!
//! State machine: `Idle` (no source configured) -> `Active` (polling) ->
//! `Stopped` (shutdown). Only the poll cycle ever advances the watermark;
//! `configure` only ever sets the source handle.

use crate::{
    error::Result, CheckpointError, CheckpointStore, Error, JobCheckpoint, JobId, RowIndex, RowTransformer,
    SinkError, SinkWriter, SourceError, SourceHandle, SourceReader, Watermark,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

/// Lifecycle state of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// No source target configured yet; ticks are skipped
    Idle,
    /// Target configured; ticks poll the source
    Active,
    /// Process shutting down; no further cycles
    Stopped,
}

/// Backoff and stall detection for failing cycles.
///
/// After `n` consecutive failed cycles the next poll is deferred by
/// `min(base_delay * 2^(n-1), max_delay)`. Once `n` reaches `stall_after`
/// the job is flagged as stalled. Retries never stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub stall_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1200),
            max_delay: Duration::from_secs(60),
            stall_after: 10,
        }
    }
}

impl RetryPolicy {
    /// No backoff: every tick after a failure polls again.
    pub fn immediate(stall_after: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            stall_after,
        }
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// How a tick or poll cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// No source configured; nothing attempted
    Idle,
    /// A previous cycle was still running; this tick was dropped
    Coalesced,
    /// The job is waiting out its retry delay
    BackingOff,
    /// The engine has been stopped
    Stopped,
    /// The source has no rows beyond the watermark
    UpToDate,
    /// The source has fewer rows than the watermark
    SourceShrank,
    /// Every row in the delta was delivered or permanently skipped
    Completed,
    /// The source read failed; watermark unchanged
    SourceUnavailable,
    /// The sink failed transiently; the remaining rows wait for the next cycle
    SinkUnavailable,
    /// A row was handled but its checkpoint could not be saved
    CheckpointFailed,
}

impl CycleOutcome {
    /// Whether the cycle counts towards backoff and stall detection.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CycleOutcome::SourceUnavailable
                | CycleOutcome::SinkUnavailable
                | CycleOutcome::CheckpointFailed
        )
    }
}

/// Summary of one tick or poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Row count reported by the source, when it was read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_rows: Option<u64>,
    pub watermark_before: Watermark,
    pub watermark_after: Watermark,
    /// Indices delivered this cycle, in order
    pub delivered: Vec<RowIndex>,
    /// Indices permanently rejected by the sink this cycle
    pub skipped: Vec<RowIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleReport {
    fn new(outcome: CycleOutcome, watermark: Watermark) -> Self {
        Self {
            outcome,
            started_at: Utc::now(),
            duration_ms: 0,
            source_rows: None,
            watermark_before: watermark,
            watermark_after: watermark,
            delivered: Vec::new(),
            skipped: Vec::new(),
            error: None,
        }
    }
}

/// Observable state of a sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub job_id: JobId,
    pub state: EngineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<SourceHandle>,
    pub watermark: Watermark,
    pub consecutive_failures: u32,
    /// Set once failures reach the policy's stall threshold
    pub stalled: bool,
    pub delivered_total: u64,
    pub skipped_total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
}

#[derive(Debug)]
struct JobState {
    state: EngineState,
    handle: Option<SourceHandle>,
    watermark: Watermark,
    consecutive_failures: u32,
    stalled: bool,
    retry_at: Option<Instant>,
    delivered_total: u64,
    skipped_total: u64,
    last_cycle: Option<CycleReport>,
}

impl JobState {
    fn new() -> Self {
        Self {
            state: EngineState::Idle,
            handle: None,
            watermark: 0,
            consecutive_failures: 0,
            stalled: false,
            retry_at: None,
            delivered_total: 0,
            skipped_total: 0,
            last_cycle: None,
        }
    }
}

/// Drives the poll cycles of one sync job.
pub struct SyncEngine {
    job_id: JobId,
    source: Arc<dyn SourceReader>,
    transformer: Arc<dyn RowTransformer>,
    sink: Arc<dyn SinkWriter>,
    checkpoints: Arc<dyn CheckpointStore>,
    retry: RetryPolicy,
    state: RwLock<JobState>,
    /// Held for the whole of a cycle; cycles never overlap.
    cycle: Mutex<()>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("job_id", &self.job_id)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create an idle engine.
    pub fn new(
        job_id: impl Into<JobId>,
        source: Arc<dyn SourceReader>,
        transformer: Arc<dyn RowTransformer>,
        sink: Arc<dyn SinkWriter>,
        checkpoints: Arc<dyn CheckpointStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            source,
            transformer,
            sink,
            checkpoints,
            retry,
            state: RwLock::new(JobState::new()),
            cycle: Mutex::new(()),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn state(&self) -> EngineState {
        self.state.read().await.state
    }

    pub async fn watermark(&self) -> Watermark {
        self.state.read().await.watermark
    }

    pub async fn handle(&self) -> Option<SourceHandle> {
        self.state.read().await.handle.clone()
    }

    /// Snapshot of the job's observable state.
    pub async fn status(&self) -> SyncStatus {
        let state = self.state.read().await;
        SyncStatus {
            job_id: self.job_id.clone(),
            state: state.state,
            handle: state.handle.clone(),
            watermark: state.watermark,
            consecutive_failures: state.consecutive_failures,
            stalled: state.stalled,
            delivered_total: state.delivered_total,
            skipped_total: state.skipped_total,
            last_cycle: state.last_cycle.clone(),
        }
    }

    /// Set the source target.
    ///
    /// The first call moves the engine from `Idle` to `Active`. A later call
    /// with a different handle replaces it but keeps the watermark, so rows
    /// of the new range below the old watermark are never forwarded.
    pub async fn configure(&self, handle: SourceHandle) -> Result<()> {
        // Saved under the state lock so a concurrent cycle cannot persist the old handle last.
        let mut state = self.state.write().await;
        match state.state {
            EngineState::Stopped => return Err(Error::Stopped(self.job_id.clone())),
            EngineState::Idle => {
                tracing::info!(job_id = %self.job_id, source = %handle, "Sync target configured");
                state.state = EngineState::Active;
            }
            EngineState::Active if state.handle.as_ref() == Some(&handle) => {
                tracing::debug!(job_id = %self.job_id, "Sync target unchanged");
                return Ok(());
            }
            EngineState::Active => {
                tracing::warn!(
                    job_id = %self.job_id,
                    previous = ?state.handle,
                    source = %handle,
                    watermark = state.watermark,
                    "Sync target replaced; watermark kept"
                );
            }
        }
        state.handle = Some(handle.clone());
        let checkpoint = JobCheckpoint::new(self.job_id.clone(), handle, state.watermark);

        if let Err(e) = self.checkpoints.save(&checkpoint).await {
            tracing::warn!(job_id = %self.job_id, "Failed to persist sync target: {}", e);
        }
        Ok(())
    }

    /// Resume a job from a stored checkpoint.
    ///
    /// The watermark only ever moves forward: resuming with a checkpoint
    /// older than the in-memory state keeps the in-memory watermark.
    pub async fn resume(&self, checkpoint: JobCheckpoint) -> Result<()> {
        if checkpoint.job_id != self.job_id {
            return Err(Error::InvalidCheckpoint(format!(
                "checkpoint for job '{}' given to job '{}'",
                checkpoint.job_id, self.job_id
            )));
        }

        let mut state = self.state.write().await;
        if state.state == EngineState::Stopped {
            return Err(Error::Stopped(self.job_id.clone()));
        }
        state.state = EngineState::Active;
        state.watermark = state.watermark.max(checkpoint.watermark);
        state.handle = Some(checkpoint.handle);

        tracing::info!(
            job_id = %self.job_id,
            watermark = state.watermark,
            "Sync job resumed from checkpoint"
        );
        Ok(())
    }

    /// Move to `Stopped`. In-flight cycles finish; no new ones start.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if state.state != EngineState::Stopped {
            state.state = EngineState::Stopped;
            tracing::info!(job_id = %self.job_id, watermark = state.watermark, "Sync job stopped");
        }
    }

    /// One scheduled poll.
    ///
    /// Skipped while idle, dropped while another cycle is running, deferred
    /// while the job is backing off after failures.
    pub async fn tick(&self) -> CycleReport {
        let Ok(_guard) = self.cycle.try_lock() else {
            let watermark = self.watermark().await;
            tracing::debug!(job_id = %self.job_id, "Poll tick coalesced: previous cycle still running");
            return CycleReport::new(CycleOutcome::Coalesced, watermark);
        };

        {
            let state = self.state.read().await;
            if let Some(retry_at) = state.retry_at {
                if state.state == EngineState::Active && Instant::now() < retry_at {
                    tracing::debug!(
                        job_id = %self.job_id,
                        failures = state.consecutive_failures,
                        "Poll tick skipped: backing off"
                    );
                    return CycleReport::new(CycleOutcome::BackingOff, state.watermark);
                }
            }
        }

        self.run_cycle().await
    }

    /// Run a poll cycle now, ignoring any backoff.
    ///
    /// Waits for a running cycle to finish first rather than overlapping it.
    pub async fn poll_once(&self) -> CycleReport {
        let _guard = self.cycle.lock().await;
        self.run_cycle().await
    }

    /// Poll on a fixed interval until `shutdown` turns true or is dropped.
    ///
    /// Missed ticks are skipped, not bursted. A hung source or sink call
    /// stalls the loop; there is no timeout beyond the collaborator's own.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(job_id = %self.job_id, period_ms = period.as_millis() as u64, "Poll loop started");

        // A receiver subscribed after shutdown was signalled never sees a change.
        while !*shutdown.borrow_and_update() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.stop().await;
    }

    /// The poll cycle proper. Caller holds the cycle lock.
    async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        let (handle, watermark_before) = {
            let state = self.state.read().await;
            match (state.state, &state.handle) {
                (EngineState::Active, Some(handle)) => (handle.clone(), state.watermark),
                (EngineState::Stopped, _) => {
                    return CycleReport::new(CycleOutcome::Stopped, state.watermark);
                }
                _ => {
                    tracing::debug!(
                        job_id = %self.job_id,
                        "Poll skipped: no sync target configured yet"
                    );
                    return CycleReport::new(CycleOutcome::Idle, state.watermark);
                }
            }
        };

        let mut report = CycleReport::new(CycleOutcome::Completed, watermark_before);

        let rows = match self.source.fetch(&handle).await {
            Ok(rows) => rows,
            Err(SourceError::Unavailable(reason)) => {
                tracing::warn!(job_id = %self.job_id, source = %handle, "Source unavailable: {}", reason);
                report.outcome = CycleOutcome::SourceUnavailable;
                report.error = Some(Error::SourceUnavailable(reason).to_string());
                return self.finish(report, started).await;
            }
        };

        let total = rows.len() as u64;
        report.source_rows = Some(total);

        if total <= watermark_before {
            if total < watermark_before {
                tracing::warn!(
                    job_id = %self.job_id,
                    total,
                    watermark = watermark_before,
                    "Source shrank below watermark; append-only assumption violated"
                );
                report.outcome = CycleOutcome::SourceShrank;
            } else {
                tracing::trace!(job_id = %self.job_id, total, "No new rows");
                report.outcome = CycleOutcome::UpToDate;
            }
            return self.finish(report, started).await;
        }

        tracing::debug!(
            job_id = %self.job_id,
            total,
            watermark = watermark_before,
            "Forwarding {} new rows",
            total - watermark_before
        );

        for (position, row) in rows.iter().enumerate().skip(watermark_before as usize) {
            let index = position as RowIndex;
            let record = self.transformer.transform(index, row);

            match self.sink.write(&record).await {
                Ok(ack) => {
                    tracing::debug!(job_id = %self.job_id, index, remote_id = ?ack.remote_id, "Row delivered");
                    report.delivered.push(index);
                }
                Err(SinkError::Rejected(reason)) => {
                    tracing::error!(
                        job_id = %self.job_id,
                        index,
                        row = ?row.cells(),
                        "Row permanently skipped: {}",
                        Error::SinkRejected { index, reason }
                    );
                    report.skipped.push(index);
                }
                Err(SinkError::Unavailable(reason)) => {
                    let err = Error::SinkUnavailable { index, reason };
                    tracing::warn!(job_id = %self.job_id, index, "Delivery paused: {}", err);
                    report.outcome = CycleOutcome::SinkUnavailable;
                    report.error = Some(err.to_string());
                    break;
                }
            }

            report.watermark_after = index + 1;

            if let Err(e) = self.advance(index + 1).await {
                tracing::error!(job_id = %self.job_id, index, "Failed to save checkpoint: {}", e);
                report.outcome = CycleOutcome::CheckpointFailed;
                report.error = Some(Error::Checkpoint(e.to_string()).to_string());
                break;
            }
        }

        self.finish(report, started).await
    }

    /// Advance the watermark past one row and persist it.
    ///
    /// The save happens under the state lock, so checkpoints reach the store
    /// in the same order as the state changes they record.
    async fn advance(&self, watermark: Watermark) -> std::result::Result<(), CheckpointError> {
        let mut state = self.state.write().await;
        state.watermark = state.watermark.max(watermark);
        // Handle is always set while a cycle runs.
        let handle = state
            .handle
            .clone()
            .unwrap_or_else(|| SourceHandle {
                spreadsheet_id: self.job_id.clone(),
                range: String::new(),
            });
        let checkpoint = JobCheckpoint::new(self.job_id.clone(), handle, state.watermark);
        self.checkpoints.save(&checkpoint).await
    }

    /// Record a finished cycle: totals, backoff and stall tracking.
    async fn finish(&self, mut report: CycleReport, started: Instant) -> CycleReport {
        report.duration_ms = started.elapsed().as_millis() as u64;

        let mut state = self.state.write().await;
        state.delivered_total += report.delivered.len() as u64;
        state.skipped_total += report.skipped.len() as u64;

        if report.outcome.is_failure() {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            let delay = self.retry.delay_for(state.consecutive_failures);
            state.retry_at = Some(Instant::now() + delay);

            if state.consecutive_failures >= self.retry.stall_after && !state.stalled {
                state.stalled = true;
                tracing::error!(
                    job_id = %self.job_id,
                    failures = state.consecutive_failures,
                    watermark = state.watermark,
                    "Sync stalled: repeated failures"
                );
            }
        } else {
            if state.stalled {
                tracing::info!(job_id = %self.job_id, "Sync recovered after stall");
            }
            state.consecutive_failures = 0;
            state.stalled = false;
            state.retry_at = None;
        }

        state.last_cycle = Some(report.clone());
        report
    }
}
