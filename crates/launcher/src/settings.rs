//! Launcher configuration
//!
//! Layers, lowest precedence first: built-in defaults, optional TOML file,
//! `STEVEDORE_*` environment variables. CLI flags are applied on top by `main`.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stevedore_core::application::{ConnectionFailurePolicy, QueueCatalog, WorkerSettings};
use stevedore_core::domain::QueueName;
use stevedore_core::error::{AppError, Result};
use stevedore_core::port::BrokerTarget;

pub const DEFAULT_BROKER_URL: &str = "sqlite://~/.stevedore/broker.db";
const ENV_PREFIX: &str = "STEVEDORE";

/// Per-queue settings (`[queues.<name>]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Broker of this queue; the global `broker_url` when absent
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub broker_url: String,
    /// Only declared queues (and `default`) may be used
    pub strict_queues: bool,
    pub queues: BTreeMap<String, QueueSettings>,
    pub poll_interval_ms: u64,
    pub job_timeout_secs: u64,
    pub connection_failure: ConnectionFailurePolicy,
    /// Environment variables passed through to job processes
    pub env_allowlist: Vec<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        let worker = WorkerSettings::default();
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            strict_queues: false,
            queues: BTreeMap::new(),
            poll_interval_ms: worker.poll_interval.as_millis() as u64,
            job_timeout_secs: worker.job_timeout.as_secs(),
            connection_failure: ConnectionFailurePolicy::default(),
            env_allowlist: stevedore_infra_system::DEFAULT_ENV_ALLOWLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LauncherSettings {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("env_allowlist"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Broker URL with `~` expanded
    pub fn broker_target(&self) -> BrokerTarget {
        BrokerTarget::new(expand_url(&self.broker_url))
    }

    /// Queue declarations as a catalog
    pub fn catalog(&self) -> Result<QueueCatalog> {
        let mut catalog = QueueCatalog::new(self.broker_target()).strict(self.strict_queues);
        for (name, queue) in &self.queues {
            let name = QueueName::parse(name.as_str())
                .map_err(|e| AppError::Configuration(e.to_string()))?;
            let target = queue.url.as_deref().map(|url| BrokerTarget::new(expand_url(url)));
            catalog = catalog.declare(name, target);
        }
        Ok(catalog)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            ..WorkerSettings::default()
        }
    }

    /// Directory of the default broker file, which is created on first use
    pub fn default_broker_dir(&self) -> Option<PathBuf> {
        if self.broker_url != DEFAULT_BROKER_URL {
            return None;
        }
        let url = expand_url(DEFAULT_BROKER_URL);
        let path = Path::new(url.strip_prefix("sqlite://")?);
        path.parent().map(Path::to_path_buf)
    }
}

/// Expand a leading `~` in the path part of a broker URL
pub fn expand_url(url: &str) -> String {
    match url.strip_prefix("sqlite://") {
        Some(path) => format!("sqlite://{}", shellexpand::tilde(path)),
        None => shellexpand::tilde(url).into_owned(),
    }
}
