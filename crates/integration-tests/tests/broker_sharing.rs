//! Several connections (standing in for worker processes) on one broker file.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::TempBroker;
use serde_json::json;
use stevedore_core::application::{shared_connection, QueueCatalog, QueueResolver};
use stevedore_core::domain::Job;
use stevedore_core::error::AppError;
use stevedore_core::port::time_provider::SystemTimeProvider;
use stevedore_core::port::Connection;
use stevedore_infra_sqlite::{create_pool, run_migrations, SqliteConnection};

const JOBS: usize = 60;

async fn drain(connection: Arc<dyn Connection>, worker: &'static str) -> Vec<String> {
    let mut claimed = Vec::new();
    while let Some(job) = connection.pop_next("default", worker).await.unwrap() {
        claimed.push(job.id);
    }
    claimed
}

/// Two workers popping the same queue never claim the same job
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_claims_are_exclusive() {
    let broker = TempBroker::new("claims");
    let first = broker.connect().await;
    let second = broker.connect().await;
    assert_ne!(first.id(), second.id());

    let mut enqueued = HashSet::new();
    for i in 0..JOBS {
        let job = Job::new_test("default", "task", json!({"n": i}));
        first.enqueue(&job).await.unwrap();
        enqueued.insert(job.id);
    }

    let a = tokio::spawn(drain(first.clone(), "worker-a"));
    let b = tokio::spawn(drain(second, "worker-b"));
    let claimed_a = a.await.unwrap();
    let claimed_b = b.await.unwrap();

    assert_eq!(claimed_a.len() + claimed_b.len(), JOBS);
    let all: HashSet<_> = claimed_a.iter().chain(claimed_b.iter()).cloned().collect();
    assert_eq!(all, enqueued);

    // Each row carries exactly one claimant
    let pool = create_pool(&broker.url()).await.unwrap();
    let unclaimed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM jobs WHERE state != 'STARTED' OR worker_name IS NULL",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(unclaimed, 0);
    let by_a: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE worker_name = 'worker-a'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(by_a as usize, claimed_a.len());
    pool.close().await;
}

#[tokio::test]
async fn test_queues_resolved_together_share_one_connection() {
    let broker = TempBroker::new("shared");
    let resolver = QueueResolver::new(QueueCatalog::new(broker.target()));
    let names = vec!["high".to_string(), "low".to_string()];

    let connection = broker.connect().await;
    let queues = resolver.resolve(&names, connection.clone()).unwrap();
    assert_eq!(shared_connection(&queues).unwrap().id(), connection.id());

    // Same broker file, different connection: not interchangeable
    let mut mixed = resolver.resolve(&names[..1], connection).unwrap();
    mixed.extend(resolver.resolve(&names[1..], broker.connect().await).unwrap());
    assert!(matches!(
        shared_connection(&mixed),
        Err(AppError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_connection_over_existing_pool() {
    let broker = TempBroker::new("pool");
    let pool = create_pool(&broker.url()).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let direct: Arc<dyn Connection> = Arc::new(SqliteConnection::new(
        pool,
        broker.target(),
        Arc::new(SystemTimeProvider),
    ));
    let job = Job::new_test("default", "task", json!({}));
    direct.enqueue(&job).await.unwrap();

    // Visible through a connection opened by the factory
    let other = broker.connect().await;
    let claimed = other.pop_next("default", "w").await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    assert!(direct.pop_next("default", "w").await.unwrap().is_none());
}
