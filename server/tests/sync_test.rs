//! Integration tests for the JSON the server exposes and persists.
//!
//! These run the engine against in-memory collaborators; no database or
//! network access is needed.

use std::sync::Arc;

use serde_json::Value;
use sheetsync_engine::{
    FormRowTransformer, JobCheckpoint, MemoryCheckpointStore, MemorySink, MemorySource,
    RetryPolicy, SourceHandle, SyncEngine,
};

/// Test helper to build an engine over fresh in-memory collaborators.
fn engine() -> (SyncEngine, Arc<MemorySource>, Arc<MemorySink>) {
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(MemorySink::new());
    let engine = SyncEngine::new(
        "1AbC-d_9",
        source.clone(),
        Arc::new(FormRowTransformer::new()),
        sink.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        RetryPolicy::immediate(3),
    );
    (engine, source, sink)
}

fn handle() -> SourceHandle {
    SourceHandle::new("1AbC-d_9", "Data!A2:D").unwrap()
}

#[cfg(test)]
mod status_tests {
    use super::*;

    #[tokio::test]
    async fn test_status_json_shape() {
        let (engine, source, sink) = engine();
        engine.configure(handle()).await.unwrap();

        source.append(["Alice", "alice@example.com", "Hi", "2024-02-01"]);
        source.append(["Bob", "bob@example.com", "Yo", "02/03/2024"]);
        source.append(["Carol", "carol@example.com", "Hey", "2024-02-04"]);
        sink.reject(1, "bad row");

        engine.poll_once().await;
        let json: Value = serde_json::to_value(engine.status().await).unwrap();

        assert_eq!(json["jobId"], "1AbC-d_9");
        assert_eq!(json["state"], "active");
        assert_eq!(json["handle"]["spreadsheetId"], "1AbC-d_9");
        assert_eq!(json["handle"]["range"], "Data!A2:D");
        assert_eq!(json["watermark"], 3);
        assert_eq!(json["stalled"], false);
        assert_eq!(json["deliveredTotal"], 2);
        assert_eq!(json["skippedTotal"], 1);

        let cycle = &json["lastCycle"];
        assert_eq!(cycle["outcome"], "completed");
        assert_eq!(cycle["watermarkBefore"], 0);
        assert_eq!(cycle["watermarkAfter"], 3);
        assert_eq!(cycle["delivered"], serde_json::json!([0, 2]));
        assert_eq!(cycle["skipped"], serde_json::json!([1]));
        assert_eq!(cycle["sourceRows"], 3);
    }

    #[tokio::test]
    async fn test_idle_status_omits_handle() {
        let (engine, _, _) = engine();
        let json: Value = serde_json::to_value(engine.status().await).unwrap();

        assert_eq!(json["state"], "idle");
        assert!(json.get("handle").is_none());
        assert!(json.get("lastCycle").is_none());
    }

    #[tokio::test]
    async fn test_stall_is_visible_in_status() {
        let (engine, source, _) = engine();
        engine.configure(handle()).await.unwrap();

        for _ in 0..3 {
            source.fail_next("quota exceeded");
            engine.tick().await;
        }

        let json: Value = serde_json::to_value(engine.status().await).unwrap();
        assert_eq!(json["consecutiveFailures"], 3);
        assert_eq!(json["stalled"], true);
        assert_eq!(json["lastCycle"]["outcome"], "source_unavailable");
        assert!(json["lastCycle"]["error"]
            .as_str()
            .unwrap()
            .contains("quota exceeded"));
    }
}

#[cfg(test)]
mod checkpoint_tests {
    use super::*;

    #[test]
    fn test_checkpoint_json_roundtrip() {
        let checkpoint = JobCheckpoint::new("1AbC-d_9", handle(), 12);
        let json = checkpoint.to_json().unwrap();

        assert!(json.contains("\"formatVersion\":1"));
        assert!(json.contains("\"jobId\":\"1AbC-d_9\""));

        let parsed = JobCheckpoint::from_json(&json).unwrap();
        assert_eq!(parsed, checkpoint);
    }

    #[test]
    fn test_checkpoint_from_newer_format_is_refused() {
        let json = r#"{
            "formatVersion": 99,
            "jobId": "1AbC-d_9",
            "handle": {"spreadsheetId": "1AbC-d_9", "range": "Data!A2:D"},
            "watermark": 4,
            "updatedAt": "2024-02-01T00:00:00Z"
        }"#;

        assert!(JobCheckpoint::from_json(json).is_err());
    }

    #[tokio::test]
    async fn test_restart_resumes_without_replay() {
        let (engine, source, sink) = engine();
        engine.configure(handle()).await.unwrap();
        source.append(["Alice", "alice@example.com", "Hi", "2024-02-01"]);
        engine.poll_once().await;

        let checkpoint = JobCheckpoint::new("1AbC-d_9", handle(), engine.watermark().await);
        let restored = JobCheckpoint::from_json(&checkpoint.to_json().unwrap()).unwrap();

        let (restarted, restarted_source, restarted_sink) = super::engine();
        restarted.resume(restored).await.unwrap();
        restarted_source.append(["Alice", "alice@example.com", "Hi", "2024-02-01"]);
        restarted_source.append(["Bob", "bob@example.com", "Yo", "2024-02-02"]);
        restarted.poll_once().await;

        assert_eq!(sink.delivered_indices(), vec![0]);
        assert_eq!(restarted_sink.delivered_indices(), vec![1]);
    }
}
