//! Delivery guarantees of the sync engine.
//!
//! Scenario tests pin down the documented behaviour of a single poll cycle;
//! property tests check ordering and no-loss across arbitrary append and
//! failure schedules.

use proptest::prelude::*;
use sheetsync_engine::{
    CycleOutcome, FormRowTransformer, JobCheckpoint, MemoryCheckpointStore, MemorySink,
    MemorySource, RetryPolicy, SourceHandle, SyncEngine,
};
use std::sync::Arc;

struct Fixture {
    source: Arc<MemorySource>,
    sink: Arc<MemorySink>,
    engine: SyncEngine,
}

fn handle() -> SourceHandle {
    SourceHandle::new("sheet-1", "Data!A2:D").unwrap()
}

fn fixture_with(checkpoints: Arc<MemoryCheckpointStore>) -> Fixture {
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(MemorySink::new());
    let engine = SyncEngine::new(
        "sheet-1",
        source.clone(),
        Arc::new(FormRowTransformer::new()),
        sink.clone(),
        checkpoints,
        RetryPolicy::immediate(u32::MAX),
    );
    Fixture {
        source,
        sink,
        engine,
    }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(MemoryCheckpointStore::new()))
}

fn row(name: &str) -> [String; 4] {
    [
        name.to_string(),
        format!("{}@example.com", name.to_lowercase()),
        format!("message from {}", name),
        "2024-02-01".to_string(),
    ]
}

fn names(sink: &MemorySink) -> Vec<String> {
    sink.delivered()
        .iter()
        .map(|r| r.value("name").unwrap_or_default().to_string())
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn three_rows_all_succeed() {
    let f = fixture();
    f.engine.configure(handle()).await.unwrap();
    for name in ["A", "B", "C"] {
        f.source.append(row(name));
    }

    let report = f.engine.poll_once().await;

    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(f.engine.watermark().await, 3);
    assert_eq!(names(&f.sink), vec!["A", "B", "C"]);
    assert_eq!(f.sink.attempts(), vec![0, 1, 2]);
}

#[tokio::test]
async fn transient_failure_retries_suffix_next_cycle() {
    let f = fixture();
    f.engine.configure(handle()).await.unwrap();
    f.source.append(row("A"));
    f.engine.poll_once().await;
    assert_eq!(f.engine.watermark().await, 1);

    for name in ["B", "C", "D"] {
        f.source.append(row(name));
    }
    f.sink.fail_once(1, "rate limited");

    let report = f.engine.poll_once().await;
    assert_eq!(report.outcome, CycleOutcome::SinkUnavailable);
    assert_eq!(f.engine.watermark().await, 1);
    assert_eq!(f.sink.attempts(), vec![0, 1]);

    let report = f.engine.poll_once().await;
    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.delivered, vec![1, 2, 3]);
    assert_eq!(f.sink.attempts(), vec![0, 1, 1, 2, 3]);
    assert_eq!(f.engine.watermark().await, 4);
}

#[tokio::test]
async fn permanent_rejection_is_skipped() {
    let f = fixture();
    f.engine.configure(handle()).await.unwrap();
    f.source.append(row("A"));
    f.source.append(row("B"));
    f.sink.reject(0, "invalid email");

    let report = f.engine.poll_once().await;

    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.skipped, vec![0]);
    assert_eq!(f.engine.watermark().await, 2);
    assert_eq!(names(&f.sink), vec!["B"]);

    // Row 0 is never retried.
    f.engine.poll_once().await;
    assert_eq!(f.sink.attempts(), vec![0, 1]);
    assert_eq!(f.engine.status().await.skipped_total, 1);
}

#[tokio::test]
async fn empty_cycle_makes_no_writes() {
    let f = fixture();
    f.engine.configure(handle()).await.unwrap();

    let report = f.engine.poll_once().await;
    assert_eq!(report.outcome, CycleOutcome::UpToDate);
    assert_eq!(report.source_rows, Some(0));

    f.source.append(row("A"));
    f.engine.poll_once().await;
    let report = f.engine.poll_once().await;

    assert_eq!(report.outcome, CycleOutcome::UpToDate);
    assert_eq!(f.sink.attempts(), vec![0]);
    assert_eq!(f.engine.watermark().await, 1);
}

#[tokio::test]
async fn non_iso_source_dates_reach_sink_normalized() {
    let f = fixture();
    f.engine.configure(handle()).await.unwrap();
    f.source
        .append(["Dana", "dana@example.com", "hi", "02/01/2024"]);

    f.engine.poll_once().await;

    let delivered = f.sink.delivered();
    assert_eq!(delivered[0].value("date"), Some("2024-02-01"));
}

#[tokio::test]
async fn restart_resumes_from_checkpoint() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());

    let first = fixture_with(checkpoints.clone());
    first.engine.configure(handle()).await.unwrap();
    for name in ["A", "B"] {
        first.source.append(row(name));
    }
    first.engine.poll_once().await;
    first.engine.stop().await;

    // A new process sees the same sheet plus one more row.
    let second = fixture_with(checkpoints.clone());
    for name in ["A", "B", "C"] {
        second.source.append(row(name));
    }
    let stored: JobCheckpoint = {
        use sheetsync_engine::CheckpointStore;
        checkpoints.load("sheet-1").await.unwrap().unwrap()
    };
    second.engine.resume(stored).await.unwrap();
    second.engine.poll_once().await;

    assert_eq!(names(&second.sink), vec!["C"]);
    assert_eq!(second.engine.watermark().await, 3);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// With a healthy sink, every appended row arrives exactly once, in order.
    #[test]
    fn no_loss_under_success(batches in prop::collection::vec(0usize..6, 1..8)) {
        runtime().block_on(async {
            let f = fixture();
            f.engine.configure(handle()).await.unwrap();

            let mut total = 0u64;
            for batch in &batches {
                for _ in 0..*batch {
                    f.source.append(row(&format!("R{}", total)));
                    total += 1;
                }
                f.engine.poll_once().await;
            }

            prop_assert_eq!(f.engine.watermark().await, total);
            prop_assert_eq!(f.sink.delivered_indices(), (0..total).collect::<Vec<_>>());
            prop_assert!(f.sink.max_concurrent_writes() <= 1);
            Ok(())
        })?;
    }

    /// Transient failures delay rows but never lose, reorder or skip them.
    #[test]
    fn at_least_once_under_transient_failure(
        rows in 1u64..12,
        failures in prop::collection::vec(0u64..12, 0..6),
    ) {
        runtime().block_on(async {
            let f = fixture();
            f.engine.configure(handle()).await.unwrap();
            for i in 0..rows {
                f.source.append(row(&format!("R{}", i)));
            }
            for index in &failures {
                f.sink.fail_once(*index, "flaky");
            }

            let mut previous = 0;
            for _ in 0..=failures.len() {
                let report = f.engine.poll_once().await;
                prop_assert!(report.watermark_after >= previous);
                if report.outcome == CycleOutcome::SinkUnavailable {
                    // The failed row is exactly where the watermark stopped.
                    let failed = *f.sink.attempts().last().unwrap();
                    prop_assert_eq!(report.watermark_after, failed);
                }
                previous = report.watermark_after;
            }

            prop_assert_eq!(f.engine.watermark().await, rows);
            prop_assert_eq!(f.sink.delivered_indices(), (0..rows).collect::<Vec<_>>());

            // Attempts never go backwards except to retry the failed row.
            let attempts = f.sink.attempts();
            for pair in attempts.windows(2) {
                prop_assert!(pair[1] == pair[0] + 1 || pair[1] == pair[0]);
            }
            Ok(())
        })?;
    }

    /// Rejected rows are passed over; every other row is still delivered.
    #[test]
    fn skip_on_permanent_rejection(
        rows in 1u64..12,
        rejected in prop::collection::btree_set(0u64..12, 0..5),
    ) {
        runtime().block_on(async {
            let f = fixture();
            f.engine.configure(handle()).await.unwrap();
            for i in 0..rows {
                f.source.append(row(&format!("R{}", i)));
            }
            for index in &rejected {
                f.sink.reject(*index, "schema");
            }

            let report = f.engine.poll_once().await;

            let expected: Vec<u64> = (0..rows).filter(|i| !rejected.contains(i)).collect();
            let skipped: Vec<u64> = (0..rows).filter(|i| rejected.contains(i)).collect();
            prop_assert_eq!(report.outcome, CycleOutcome::Completed);
            prop_assert_eq!(f.engine.watermark().await, rows);
            prop_assert_eq!(f.sink.delivered_indices(), expected);
            prop_assert_eq!(report.skipped, skipped);
            prop_assert_eq!(f.sink.attempts(), (0..rows).collect::<Vec<_>>());
            Ok(())
        })?;
    }
}
