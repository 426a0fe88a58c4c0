// Queue Resolver - maps queue names to handles sharing one connection

use crate::domain::{Job, QueueName, WorkerName};
use crate::error::{AppError, Result};
use crate::port::{BrokerTarget, Connection};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Live queue handle bound to a connection.
///
/// The connection is shared with every other queue of the same worker.
#[derive(Clone)]
pub struct Queue {
    name: QueueName,
    connection: Arc<dyn Connection>,
}

impl Queue {
    pub fn new(name: QueueName, connection: Arc<dyn Connection>) -> Self {
        Self { name, connection }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub async fn enqueue(&self, job: &Job) -> Result<()> {
        if job.queue != self.name() {
            return Err(AppError::Configuration(format!(
                "Job {} belongs to queue '{}', not '{}'",
                job.id,
                job.queue,
                self.name()
            )));
        }
        self.connection.enqueue(job).await
    }

    /// Claim the next job of this queue, if any
    pub async fn dequeue(&self, worker: &WorkerName) -> Result<Option<Job>> {
        self.connection.pop_next(self.name(), worker.as_str()).await
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("connection", &self.connection.id())
            .finish()
    }
}

/// Declared queues and the brokers they live on
#[derive(Debug, Clone)]
pub struct QueueCatalog {
    default_target: BrokerTarget,
    declared: HashMap<QueueName, BrokerTarget>,
    /// Reject names that were not declared
    strict: bool,
}

impl QueueCatalog {
    pub fn new(default_target: BrokerTarget) -> Self {
        Self {
            default_target,
            declared: HashMap::new(),
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Declare a queue; `target = None` means the default broker
    pub fn declare(mut self, name: QueueName, target: Option<BrokerTarget>) -> Self {
        let target = target.unwrap_or_else(|| self.default_target.clone());
        self.declared.insert(name, target);
        self
    }

    pub fn default_target(&self) -> &BrokerTarget {
        &self.default_target
    }

    fn target_of(&self, name: &QueueName) -> Result<&BrokerTarget> {
        match self.declared.get(name) {
            Some(target) => Ok(target),
            None if self.strict && name.as_str() != crate::domain::DEFAULT_QUEUE => Err(
                AppError::Configuration(format!("Queue '{}' is not declared", name)),
            ),
            None => Ok(&self.default_target),
        }
    }
}

/// Resolves queue name lists against a catalog
#[derive(Debug, Clone)]
pub struct QueueResolver {
    catalog: QueueCatalog,
}

impl QueueResolver {
    pub fn new(catalog: QueueCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &QueueCatalog {
        &self.catalog
    }

    /// Validate names, substituting the default queue for an empty list.
    /// Order and duplicates are preserved.
    pub fn parse_names(names: &[String]) -> Result<Vec<QueueName>> {
        if names.is_empty() {
            return Ok(vec![QueueName::default_queue()]);
        }
        names
            .iter()
            .map(|n| {
                QueueName::parse(n.as_str()).map_err(|e| AppError::Configuration(e.to_string()))
            })
            .collect()
    }

    /// The single broker every queue of `names` lives on.
    ///
    /// No I/O. Fails if a name is invalid or unknown (strict catalogs), or if
    /// the queues span more than one broker.
    pub fn target_for(&self, names: &[String]) -> Result<BrokerTarget> {
        let parsed = Self::parse_names(names)?;
        let mut target: Option<&BrokerTarget> = None;
        for name in &parsed {
            let queue_target = self.catalog.target_of(name)?;
            match target {
                None => target = Some(queue_target),
                Some(t) if t == queue_target => {}
                Some(t) => {
                    return Err(AppError::Configuration(format!(
                        "Queues must share the same connection: \
                         '{}' uses {} but earlier queues use {}",
                        name, queue_target, t
                    )))
                }
            }
        }
        Ok(target.unwrap_or(self.catalog.default_target()).clone())
    }

    /// Bind `names` to `connection`, in caller order (= dequeue priority).
    pub fn resolve(&self, names: &[String], connection: Arc<dyn Connection>) -> Result<Vec<Queue>> {
        let expected = self.target_for(names)?;
        if connection.target() != &expected {
            return Err(AppError::Configuration(format!(
                "Connection to {} cannot serve queues living on {}",
                connection.target(),
                expected
            )));
        }
        let queues: Vec<Queue> = Self::parse_names(names)?
            .into_iter()
            .map(|name| Queue::new(name, connection.clone()))
            .collect();
        debug!(
            queues = ?queues.iter().map(Queue::name).collect::<Vec<_>>(),
            connection = %connection.id(),
            "Resolved queues"
        );
        Ok(queues)
    }
}

/// Return the connection shared by all `queues`.
///
/// Fails with `AppError::Configuration` when the list is empty or the queues
/// are bound to different connections.
pub fn shared_connection(queues: &[Queue]) -> Result<Arc<dyn Connection>> {
    let first = queues
        .first()
        .ok_or_else(|| AppError::Configuration("A worker needs at least one queue".to_string()))?;
    let connection = first.connection();
    if let Some(other) = queues
        .iter()
        .find(|q| q.connection().id() != connection.id())
    {
        return Err(AppError::Configuration(format!(
            "Queues must share the same connection: '{}' and '{}' use different connections",
            first.name(),
            other.name()
        )));
    }
    Ok(connection.clone())
}
