// Worker Registry - resolves worker implementations by identifier

use crate::application::worker::{ExecutionStyle, QueueWorker, Worker, WorkerSpec};
use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Default worker implementation: jobs run on their own task
pub const DEFAULT_WORKER_CLASS: &str = "stevedore.Worker";

/// Worker that runs jobs inline on the loop task
pub const SIMPLE_WORKER_CLASS: &str = "stevedore.SimpleWorker";

/// Builds a worker from its spec
pub type WorkerConstructor = Arc<dyn Fn(WorkerSpec) -> Result<Box<dyn Worker>> + Send + Sync>;

/// Maps qualified identifiers (`namespace.Name`) to worker constructors
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    constructors: BTreeMap<String, WorkerConstructor>,
}

impl WorkerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in implementations
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(DEFAULT_WORKER_CLASS, |spec| {
            Ok(Box::new(QueueWorker::new(spec, ExecutionStyle::Isolated)?) as Box<dyn Worker>)
        });
        registry.insert(SIMPLE_WORKER_CLASS, |spec| {
            Ok(Box::new(QueueWorker::new(spec, ExecutionStyle::Inline)?) as Box<dyn Worker>)
        });
        registry
    }

    /// Register a constructor under `identifier`, replacing any previous one
    pub fn register<F>(&mut self, identifier: &str, constructor: F) -> Result<&mut Self>
    where
        F: Fn(WorkerSpec) -> Result<Box<dyn Worker>> + Send + Sync + 'static,
    {
        validate_identifier(identifier)?;
        self.insert(identifier, constructor);
        Ok(self)
    }

    fn insert<F>(&mut self, identifier: &str, constructor: F)
    where
        F: Fn(WorkerSpec) -> Result<Box<dyn Worker>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(identifier.to_string(), Arc::new(constructor));
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.constructors.contains_key(identifier)
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Look up a constructor without building anything
    pub fn resolve(&self, identifier: &str) -> Result<WorkerConstructor> {
        validate_identifier(identifier)?;
        self.constructors.get(identifier).cloned().ok_or_else(|| {
            AppError::Resolution(format!(
                "No worker implementation registered as '{}' (known: {})",
                identifier,
                self.identifiers().join(", ")
            ))
        })
    }

    /// Construct the worker registered as `identifier`
    pub fn build(&self, identifier: &str, spec: WorkerSpec) -> Result<Box<dyn Worker>> {
        let constructor = self.resolve(identifier)?;
        debug!(identifier = %identifier, worker = %spec.name, "Constructing worker");
        constructor(spec)
    }
}

/// Identifiers are dotted paths: `segment(.segment)+`, each segment an identifier
fn validate_identifier(identifier: &str) -> Result<()> {
    let segments: Vec<&str> = identifier.split('.').collect();
    let valid_segment = |s: &&str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if segments.len() < 2 || !segments.iter().all(valid_segment) {
        return Err(AppError::Resolution(format!(
            "'{}' is not a qualified worker identifier (expected e.g. '{}')",
            identifier, DEFAULT_WORKER_CLASS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queues::Queue;
    use crate::application::worker::WorkerSettings;
    use crate::domain::{QueueName, WorkerName};
    use crate::port::connection::mocks::InMemoryConnection;
    use crate::port::job_executor::mocks::MockJobExecutor;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::Connection;

    fn spec(conn: Arc<dyn Connection>) -> WorkerSpec {
        WorkerSpec {
            name: WorkerName::parse("w").unwrap(),
            queues: vec![Queue::new(QueueName::default_queue(), conn)],
            executor: Arc::new(MockJobExecutor::new_success()),
            time_provider: Arc::new(SystemTimeProvider),
            settings: WorkerSettings::default(),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = WorkerRegistry::with_builtins();
        assert_eq!(
            registry.identifiers(),
            vec![SIMPLE_WORKER_CLASS, DEFAULT_WORKER_CLASS]
        );
    }

    #[test]
    fn test_build_default_worker() {
        let conn: Arc<dyn Connection> = Arc::new(InMemoryConnection::new());
        let worker = WorkerRegistry::with_builtins()
            .build(DEFAULT_WORKER_CLASS, spec(conn.clone()))
            .unwrap();
        assert_eq!(worker.name().as_str(), "w");
        assert_eq!(worker.connection().id(), conn.id());
        assert_eq!(worker.queues().len(), 1);
    }

    #[test]
    fn test_unknown_identifier_is_resolution_error() {
        let registry = WorkerRegistry::with_builtins();
        let conn: Arc<dyn Connection> = Arc::new(InMemoryConnection::new());

        let err = registry.build("nonexistent.module.Worker", spec(conn)).err().unwrap();
        assert!(matches!(err, AppError::Resolution(_)));
        assert!(err.to_string().contains("nonexistent.module.Worker"));
    }

    #[test]
    fn test_malformed_identifier_rejected() {
        let registry = WorkerRegistry::with_builtins();
        for bad in ["Worker", "", "stevedore.", ".Worker", "stevedore.9Worker", "a b.C"] {
            assert!(
                matches!(registry.resolve(bad), Err(AppError::Resolution(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = WorkerRegistry::new();
        registry
            .register("acme.workers.Custom", |spec| {
                Ok(Box::new(QueueWorker::new(spec, ExecutionStyle::Inline)?) as Box<dyn Worker>)
            })
            .unwrap();
        assert!(registry.contains("acme.workers.Custom"));
        let undotted = registry.register("nodots", |spec| {
            Ok(Box::new(QueueWorker::new(spec, ExecutionStyle::Inline)?) as Box<dyn Worker>)
        });
        assert!(undotted.is_err());
    }
}
