//! Sync job registry.
//!
//! Owns one [`SyncEngine`] per spreadsheet, each with its own poll task.
//! Jobs survive restarts through the checkpoint store.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sheetsync_engine::{
    CheckpointStore, Error, JobCheckpoint, JobId, RetryPolicy, RowTransformer, SinkWriter,
    SourceHandle, SourceReader, SyncEngine, SyncStatus,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared collaborators every job is built from.
#[derive(Clone)]
pub struct JobDeps {
    pub source: Arc<dyn SourceReader>,
    pub transformer: Arc<dyn RowTransformer>,
    pub sink: Arc<dyn SinkWriter>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

/// Tracks running sync jobs, keyed by spreadsheet id.
///
/// Thread-safe and can be shared across handlers via `Arc`.
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<SyncEngine>>,
    tasks: DashMap<JobId, JoinHandle<()>>,
    deps: JobDeps,
    poll_interval: Duration,
    retry: RetryPolicy,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs.len())
            .field("poll_interval", &self.poll_interval)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl JobRegistry {
    pub fn new(deps: JobDeps, poll_interval: Duration, retry: RetryPolicy) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: DashMap::new(),
            tasks: DashMap::new(),
            deps,
            poll_interval,
            retry,
            shutdown,
        }
    }

    /// Create a new registry wrapped in Arc for sharing.
    pub fn new_shared(deps: JobDeps, poll_interval: Duration, retry: RetryPolicy) -> Arc<Self> {
        Arc::new(Self::new(deps, poll_interval, retry))
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn build(&self, job_id: &str) -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(
            job_id,
            self.deps.source.clone(),
            self.deps.transformer.clone(),
            self.deps.sink.clone(),
            self.deps.checkpoints.clone(),
            self.retry,
        ))
    }

    /// Add an engine unless one is already registered under its id, and
    /// start its poll loop. Returns whichever engine ends up registered.
    fn register(&self, engine: Arc<SyncEngine>) -> Arc<SyncEngine> {
        let job_id = engine.job_id().to_string();
        let registered = self
            .jobs
            .entry(job_id.clone())
            .or_insert_with(|| engine.clone())
            .clone();

        if Arc::ptr_eq(&registered, &engine) {
            let task = tokio::spawn(
                engine
                    .clone()
                    .run(self.poll_interval, self.shutdown.subscribe()),
            );
            self.tasks.insert(job_id.clone(), task);
            tracing::info!(job_id = %job_id, "Sync job registered");
        }
        registered
    }

    /// Point the job for `handle`'s spreadsheet at `handle`, creating and
    /// starting it if needed.
    ///
    /// A new job picks up its stored checkpoint first, so reconfiguring after
    /// a restart never replays rows already forwarded.
    pub async fn configure(&self, handle: SourceHandle) -> Result<Arc<SyncEngine>, Error> {
        let job_id = handle.spreadsheet_id.clone();
        if self.is_shut_down() {
            return Err(Error::Stopped(job_id));
        }

        let existing = self.jobs.get(&job_id).map(|entry| entry.value().clone());
        let engine = match existing {
            Some(engine) => engine,
            None => {
                let engine = self.build(&job_id);
                let stored = self
                    .deps
                    .checkpoints
                    .load(&job_id)
                    .await
                    .map_err(|e| Error::Checkpoint(e.to_string()))?;
                if let Some(checkpoint) = stored {
                    engine.resume(checkpoint).await?;
                }
                self.register(engine)
            }
        };

        engine.configure(handle).await?;
        Ok(engine)
    }

    /// Start a job for every stored checkpoint. Returns how many were resumed.
    pub async fn restore(&self) -> Result<usize, Error> {
        let checkpoints = self
            .deps
            .checkpoints
            .load_all()
            .await
            .map_err(|e| Error::Checkpoint(e.to_string()))?;

        let mut restored = 0;
        for checkpoint in checkpoints {
            if self.resume_one(checkpoint).await {
                restored += 1;
            }
        }

        if restored == 0 {
            tracing::info!("No sync jobs restored; waiting for a form submission to configure one");
        } else {
            tracing::info!(jobs = restored, "Restored sync jobs from checkpoints");
        }
        Ok(restored)
    }

    async fn resume_one(&self, checkpoint: JobCheckpoint) -> bool {
        if self.is_shut_down() || self.jobs.contains_key(&checkpoint.job_id) {
            return false;
        }

        let engine = self.build(&checkpoint.job_id);
        let job_id = checkpoint.job_id.clone();
        match engine.resume(checkpoint).await {
            Ok(()) => {
                self.register(engine);
                true
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, "Could not resume sync job: {}", e);
                false
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<SyncEngine>> {
        self.jobs.get(job_id).map(|entry| entry.value().clone())
    }

    /// Status of every job, ordered by job id.
    pub async fn statuses(&self) -> Vec<SyncStatus> {
        let engines: Vec<Arc<SyncEngine>> =
            self.jobs.iter().map(|entry| entry.value().clone()).collect();

        let mut statuses = Vec::with_capacity(engines.len());
        for engine in engines {
            statuses.push(engine.status().await);
        }
        statuses.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        statuses
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Signal every poll loop to stop and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let ids: Vec<JobId> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for job_id in ids {
            if let Some((_, task)) = self.tasks.remove(&job_id) {
                if let Err(e) = task.await {
                    tracing::error!(job_id = %job_id, "Poll task ended abnormally: {}", e);
                }
            }
        }

        tracing::info!(jobs = self.jobs.len(), "Sync jobs stopped");
    }
}
