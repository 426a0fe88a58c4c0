//! Runs the built `stevedore-worker` binary with `--count` against a temp broker.
#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stevedore_core::application::{EnqueueRequest, EnqueueService, Queue};
use stevedore_core::domain::{JobState, QueueName};
use stevedore_core::port::id_provider::UuidProvider;
use stevedore_core::port::time_provider::SystemTimeProvider;
use stevedore_core::port::{BrokerTarget, ConnectionFactory};
use stevedore_infra_sqlite::SqliteConnectionFactory;

const WORKER_BIN: &str = env!("CARGO_BIN_EXE_stevedore-worker");

struct TempDatabase(PathBuf);

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.0.display(), suffix));
        }
    }
}

#[tokio::test]
async fn test_spawned_workers_drain_queues_and_parent_exits_cleanly() {
    let db = TempDatabase(
        std::env::temp_dir().join(format!("stevedore_bin_{}.db", std::process::id())),
    );
    let url = format!("sqlite://{}", db.0.display());

    let connection = SqliteConnectionFactory::new(Arc::new(SystemTimeProvider))
        .connect(&BrokerTarget::new(url.clone()))
        .await
        .unwrap();
    let service = EnqueueService::new(Arc::new(UuidProvider), Arc::new(SystemTimeProvider));

    let mut jobs = Vec::new();
    for queue_name in ["high", "low"] {
        let queue = Queue::new(QueueName::parse(queue_name).unwrap(), connection.clone());
        for _ in 0..4 {
            let job = service
                .enqueue(
                    &queue,
                    EnqueueRequest {
                        job_type: "noop".to_string(),
                        payload: json!({"command": "true"}),
                    },
                )
                .await
                .unwrap();
            jobs.push(job.id);
        }
    }

    let output = tokio::time::timeout(
        Duration::from_secs(60),
        tokio::process::Command::new(WORKER_BIN)
            .args(["--count", "3", "--name", "w", "--burst", "--broker-url", url.as_str()])
            .args(["--", "high", "low"])
            .env_remove("STEVEDORE_CONFIG")
            .env_remove("STEVEDORE_BROKER_URL")
            .kill_on_drop(true)
            .output(),
    )
    .await
    .expect("worker group did not finish in time")
    .unwrap();

    assert!(
        output.status.success(),
        "exit {:?}\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let names = ["w.0", "w.1", "w.2"];
    for id in &jobs {
        let stored = connection.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Finished, "job {}", id);
        let worker = stored.worker_name.unwrap_or_default();
        assert!(names.contains(&worker.as_str()), "job {} ran on {:?}", id, worker);
    }

    // Burst workers unregister on exit
    assert!(connection.list_workers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_broker_url_exits_with_error_before_spawning() {
    let output = tokio::process::Command::new(WORKER_BIN)
        .args(["--count", "3", "--burst", "--broker-url", "redis://localhost:6379/0"])
        .env_remove("STEVEDORE_CONFIG")
        .output()
        .await
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration error"), "{stderr}");
}
