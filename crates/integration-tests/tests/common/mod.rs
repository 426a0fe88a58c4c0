//! Shared fixtures: file-backed SQLite brokers in the temp directory
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use stevedore_core::port::time_provider::SystemTimeProvider;
use stevedore_core::port::{BrokerTarget, Connection, ConnectionFactory};
use stevedore_infra_sqlite::SqliteConnectionFactory;

/// Broker database removed (with its WAL files) on drop
pub struct TempBroker {
    path: PathBuf,
}

impl TempBroker {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "stevedore_it_{}_{}.db",
            name,
            std::process::id()
        ));
        remove_database(&path);
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    pub fn target(&self) -> BrokerTarget {
        BrokerTarget::new(self.url())
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub async fn connect(&self) -> Arc<dyn Connection> {
        factory().connect(&self.target()).await.unwrap()
    }
}

impl Drop for TempBroker {
    fn drop(&mut self) {
        remove_database(&self.path);
    }
}

fn remove_database(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

pub fn factory() -> SqliteConnectionFactory {
    SqliteConnectionFactory::new(Arc::new(SystemTimeProvider))
}

/// URL whose parent directory is a regular file, so it can never be opened
pub fn unreachable_url(name: &str) -> (PathBuf, String) {
    let file = std::env::temp_dir().join(format!(
        "stevedore_it_blocker_{}_{}",
        name,
        std::process::id()
    ));
    std::fs::write(&file, b"not a directory").unwrap();
    let url = format!("sqlite://{}/broker.db", file.display());
    (file, url)
}
