//! End-to-end launches against a file-backed SQLite broker.

mod common;

use std::sync::Arc;

use common::{factory, unreachable_url, TempBroker};
use serde_json::json;
use stevedore_core::application::{
    ConnectionFailurePolicy, LaunchOutcome, LaunchRequest, Launcher, QueueCatalog, QueueResolver,
    ShutdownToken, WorkerRegistry, SIMPLE_WORKER_CLASS,
};
use stevedore_core::domain::{Job, JobState, QueueName, WorkerState};
use stevedore_core::error::AppError;
use stevedore_core::port::id_provider::UuidProvider;
use stevedore_core::port::job_executor::mocks::{MockBehavior, MockJobExecutor};
use stevedore_core::port::process_spawner::mocks::RecordingSpawner;
use stevedore_core::port::time_provider::SystemTimeProvider;
use stevedore_core::port::{BrokerTarget, TimeProvider, WorkerRegistration};

fn launcher(
    catalog: QueueCatalog,
    executor: Arc<MockJobExecutor>,
    spawner: Arc<RecordingSpawner>,
) -> Launcher {
    Launcher::new(
        QueueResolver::new(catalog),
        WorkerRegistry::with_builtins(),
        Arc::new(factory()),
        executor,
        spawner,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    )
}

fn burst(queues: &[&str]) -> LaunchRequest {
    LaunchRequest {
        queues: queues.iter().map(|s| s.to_string()).collect(),
        burst: true,
        ..Default::default()
    }
}

/// Jobs A (low), B (high), C (high) run as B, C, A and all end Finished
#[tokio::test]
async fn test_burst_worker_drains_queues_in_priority_order() {
    let broker = TempBroker::new("priority");
    let setup = broker.connect().await;

    let a = Job::new_test("low", "task", json!({"name": "A"}));
    let b = Job::new_test("high", "task", json!({"name": "B"}));
    let c = Job::new_test("high", "task", json!({"name": "C"}));
    for job in [&a, &b, &c] {
        setup.enqueue(job).await.unwrap();
    }

    let executor = Arc::new(MockJobExecutor::new_success());
    let spawner = Arc::new(RecordingSpawner::new());
    let outcome = launcher(
        QueueCatalog::new(broker.target()),
        executor.clone(),
        spawner.clone(),
    )
    .launch(
        &LaunchRequest {
            name: Some("solo".to_string()),
            ..burst(&["high", "low"])
        },
        ShutdownToken::never(),
    )
    .await
    .unwrap();

    match outcome {
        LaunchOutcome::Completed { worker, summary } => {
            assert_eq!(worker.as_str(), "solo");
            assert_eq!(summary.succeeded, 3);
            assert_eq!(summary.failed, 0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(executor.executed(), vec![b.id.clone(), c.id.clone(), a.id.clone()]);
    assert!(spawner.invocations().is_empty());

    // Every job saw the same connection
    let connections = executor.connections();
    assert!(connections.iter().all(|id| id == &connections[0]));

    for job in [&a, &b, &c] {
        let stored = setup.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Finished);
        assert_eq!(stored.worker_name.as_deref(), Some("solo"));
    }

    // Worker entry is gone once the burst is over
    assert!(setup.list_workers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_job_is_recorded_and_worker_continues() {
    let broker = TempBroker::new("failure");
    let setup = broker.connect().await;

    let broken = Job::new_test("default", "broken", json!({}));
    let fine = Job::new_test("default", "fine", json!({}));
    setup.enqueue(&broken).await.unwrap();
    setup.enqueue(&fine).await.unwrap();

    let executor = Arc::new(
        MockJobExecutor::new_success().on_job_type("broken", MockBehavior::NonZeroExit(2)),
    );
    let outcome = launcher(
        QueueCatalog::new(broker.target()),
        executor.clone(),
        Arc::new(RecordingSpawner::new()),
    )
    .launch(&burst(&[]), ShutdownToken::never())
    .await
    .unwrap();

    match outcome {
        LaunchOutcome::Completed { summary, .. } => {
            assert_eq!(summary.succeeded, 1);
            assert_eq!(summary.failed, 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let stored = setup.find_by_id(&broken.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert!(stored.error.unwrap_or_default().contains("exited with code 2"));
    let stored = setup.find_by_id(&fine.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Finished);
}

#[tokio::test]
async fn test_simple_worker_class_runs_inline() {
    let broker = TempBroker::new("simple");
    let setup = broker.connect().await;
    let job = Job::new_test("default", "task", json!({}));
    setup.enqueue(&job).await.unwrap();

    let executor = Arc::new(MockJobExecutor::new_success());
    let outcome = launcher(
        QueueCatalog::new(broker.target()),
        executor.clone(),
        Arc::new(RecordingSpawner::new()),
    )
    .launch(
        &LaunchRequest {
            worker_class: SIMPLE_WORKER_CLASS.to_string(),
            ..burst(&[])
        },
        ShutdownToken::never(),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, LaunchOutcome::Completed { .. }));
    assert_eq!(executor.executed(), vec![job.id.clone()]);
}

#[tokio::test]
async fn test_multiple_workers_are_spawned_without_touching_the_broker() {
    let broker = TempBroker::new("spawn");
    let spawner = Arc::new(RecordingSpawner::new());

    let outcome = launcher(
        QueueCatalog::new(broker.target()),
        Arc::new(MockJobExecutor::new_success()),
        spawner.clone(),
    )
    .launch(
        &LaunchRequest {
            count: 3,
            name: Some("w".to_string()),
            ..burst(&["high", "low"])
        },
        ShutdownToken::never(),
    )
    .await
    .unwrap();

    match outcome {
        LaunchOutcome::Spawned(group) => assert_eq!(group.len(), 3),
        other => panic!("unexpected outcome {:?}", other),
    }

    let names: Vec<_> = spawner
        .invocations()
        .into_iter()
        .map(|i| i.name.unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["w.0", "w.1", "w.2"]);
    // The parent never opened the database
    assert!(!broker.exists());
}

#[tokio::test]
async fn test_unreachable_broker_is_reported() {
    let (blocker, url) = unreachable_url("report");

    let outcome = launcher(
        QueueCatalog::new(BrokerTarget::new(url.clone())),
        Arc::new(MockJobExecutor::new_success()),
        Arc::new(RecordingSpawner::new()),
    )
    .launch(&burst(&[]), ShutdownToken::never())
    .await
    .unwrap();
    std::fs::remove_file(&blocker).unwrap();

    match outcome {
        LaunchOutcome::ConnectionFailed { reason } => {
            assert!(reason.contains("Error connecting to"), "{reason}");
            assert!(reason.contains(&url), "{reason}");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_broker_fails_under_fail_policy() {
    let (blocker, url) = unreachable_url("fail");

    let result = launcher(
        QueueCatalog::new(BrokerTarget::new(url)),
        Arc::new(MockJobExecutor::new_success()),
        Arc::new(RecordingSpawner::new()),
    )
    .with_failure_policy(ConnectionFailurePolicy::Fail)
    .launch(&burst(&[]), ShutdownToken::never())
    .await;
    std::fs::remove_file(&blocker).unwrap();

    assert!(matches!(result, Err(AppError::Connection(_))));
}

#[tokio::test]
async fn test_unknown_worker_class_fails_before_connecting() {
    let broker = TempBroker::new("unknown_class");

    let result = launcher(
        QueueCatalog::new(broker.target()),
        Arc::new(MockJobExecutor::new_success()),
        Arc::new(RecordingSpawner::new()),
    )
    .launch(
        &LaunchRequest {
            worker_class: "myapp.workers.Missing".to_string(),
            ..burst(&[])
        },
        ShutdownToken::never(),
    )
    .await;

    assert!(matches!(result, Err(AppError::Resolution(_))));
    assert!(!broker.exists());
}

#[tokio::test]
async fn test_queues_on_different_brokers_abort_launch() {
    let main = TempBroker::new("mixed_main");
    let archive = TempBroker::new("mixed_archive");
    let catalog = QueueCatalog::new(main.target())
        .declare(QueueName::parse("archive").unwrap(), Some(archive.target()));

    let result = launcher(
        catalog,
        Arc::new(MockJobExecutor::new_success()),
        Arc::new(RecordingSpawner::new()),
    )
    .launch(&burst(&["high", "archive"]), ShutdownToken::never())
    .await;

    assert!(matches!(result, Err(AppError::Configuration(_))));
    assert!(!main.exists());
    assert!(!archive.exists());
}

#[tokio::test]
async fn test_live_worker_name_cannot_be_reused() {
    let broker = TempBroker::new("duplicate");
    let setup = broker.connect().await;
    let job = Job::new_test("default", "task", json!({}));
    setup.enqueue(&job).await.unwrap();

    let now = SystemTimeProvider.now_millis();
    setup
        .register_worker(
            &WorkerRegistration {
                name: "dup".to_string(),
                pid: 1,
                queues: vec!["default".to_string()],
                state: WorkerState::Idle,
                current_job: None,
                birth: now,
                last_heartbeat: now,
            },
            60_000,
        )
        .await
        .unwrap();

    let executor = Arc::new(MockJobExecutor::new_success());
    let result = launcher(
        QueueCatalog::new(broker.target()),
        executor.clone(),
        Arc::new(RecordingSpawner::new()),
    )
    .launch(
        &LaunchRequest {
            name: Some("dup".to_string()),
            ..burst(&[])
        },
        ShutdownToken::never(),
    )
    .await;

    assert!(matches!(result, Err(AppError::Configuration(_))));
    assert_eq!(executor.call_count(), 0);
    let stored = setup.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Queued);
}

#[tokio::test]
async fn test_unsupported_broker_scheme_rejected_before_spawning() {
    let spawner = Arc::new(RecordingSpawner::new());

    let result = launcher(
        QueueCatalog::new(BrokerTarget::new("redis://localhost:6379/0")),
        Arc::new(MockJobExecutor::new_success()),
        spawner.clone(),
    )
    .launch(
        &LaunchRequest {
            count: 3,
            ..burst(&["high", "low"])
        },
        ShutdownToken::never(),
    )
    .await;

    assert!(matches!(result, Err(AppError::Configuration(_))), "{result:?}");
    assert!(spawner.invocations().is_empty());
}

#[tokio::test]
async fn test_malformed_broker_url_is_configuration_error() {
    let broker = TempBroker::new("bad_mode");
    let url = format!("{}?mode=bogus", broker.url());

    for count in [1, 3] {
        let spawner = Arc::new(RecordingSpawner::new());
        let result = launcher(
            QueueCatalog::new(BrokerTarget::new(url.clone())),
            Arc::new(MockJobExecutor::new_success()),
            spawner.clone(),
        )
        .launch(
            &LaunchRequest {
                count,
                ..burst(&[])
            },
            ShutdownToken::never(),
        )
        .await;

        assert!(
            matches!(result, Err(AppError::Configuration(_))),
            "count {count}: {result:?}"
        );
        assert!(spawner.invocations().is_empty());
    }
    assert!(!broker.exists());
}
