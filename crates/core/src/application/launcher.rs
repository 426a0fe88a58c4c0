// Launcher - provisions one in-process worker or N worker processes

use crate::application::queues::QueueResolver;
use crate::application::registry::{WorkerRegistry, DEFAULT_WORKER_CLASS};
use crate::application::worker::{RunSummary, ShutdownToken, WorkerSettings, WorkerSpec};
use crate::domain::{RunMode, WorkerName};
use crate::error::{AppError, Result};
use crate::port::{
    BrokerTarget, ConnectionFactory, JobExecutor, NameProvider, ProcessSpawner, TimeProvider,
    WorkerInvocation, WorkerProcess,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Queue names in priority order; empty means the default queue
    pub queues: Vec<String>,
    /// Number of workers (>= 1). More than one means one OS process each.
    pub count: usize,
    /// Base worker name
    pub name: Option<String>,
    /// Worker implementation identifier
    pub worker_class: String,
    pub burst: bool,
}

impl Default for LaunchRequest {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            count: 1,
            name: None,
            worker_class: DEFAULT_WORKER_CLASS.to_string(),
            burst: false,
        }
    }
}

/// What happens when the broker cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionFailurePolicy {
    /// Report the failure and return normally (exit status 0)
    #[default]
    Report,
    /// Return the connection error to the caller (non-zero exit status)
    Fail,
}

impl std::str::FromStr for ConnectionFailurePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "fail" => Ok(Self::Fail),
            other => Err(AppError::Configuration(format!(
                "Unknown connection failure policy '{}' (expected 'report' or 'fail')",
                other
            ))),
        }
    }
}

/// Result of a launch
pub enum LaunchOutcome {
    /// Single worker ran in this process and its loop exited
    Completed {
        worker: WorkerName,
        summary: RunSummary,
    },
    /// Broker unreachable; reported instead of raised
    ConnectionFailed { reason: String },
    /// Worker processes were started; they are not awaited
    Spawned(ProcessGroup),
}

impl std::fmt::Debug for LaunchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchOutcome::Completed { worker, summary } => f
                .debug_struct("Completed")
                .field("worker", worker)
                .field("summary", summary)
                .finish(),
            LaunchOutcome::ConnectionFailed { reason } => f
                .debug_struct("ConnectionFailed")
                .field("reason", reason)
                .finish(),
            LaunchOutcome::Spawned(group) => f
                .debug_struct("Spawned")
                .field("pids", &group.pids())
                .field("requested", &group.requested())
                .finish(),
        }
    }
}

/// Spawned worker processes.
///
/// Tracks liveness only. Nothing here joins, restarts or supervises them,
/// and their exit statuses are not reported back.
pub struct ProcessGroup {
    processes: Vec<Box<dyn WorkerProcess>>,
    requested: usize,
}

impl ProcessGroup {
    /// Processes actually started
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Processes the launch asked for
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Processes that failed to start
    pub fn missing(&self) -> usize {
        self.requested - self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().map(|p| p.pid()).collect()
    }

    pub fn names(&self) -> Vec<Option<String>> {
        self.processes
            .iter()
            .map(|p| p.name().map(str::to_string))
            .collect()
    }

    /// Number of processes that have not exited yet
    pub fn live_count(&mut self) -> usize {
        self.processes
            .iter_mut()
            .map(|p| p.is_running())
            .filter(|running| *running)
            .count()
    }

    /// Ask every live process to stop gracefully
    pub fn terminate_all(&mut self) -> Result<()> {
        for process in self.processes.iter_mut() {
            if process.is_running() {
                process.terminate()?;
            }
        }
        Ok(())
    }
}

/// Names for `count` workers: `{base}.{i}` with a base, `None` (generate) without.
/// A single worker keeps the base name unchanged.
pub fn derive_worker_names(base: Option<&str>, count: usize) -> Result<Vec<Option<WorkerName>>> {
    let to_config = |e: crate::domain::DomainError| AppError::Configuration(e.to_string());
    match base {
        None => Ok(vec![None; count]),
        Some(base) if count == 1 => Ok(vec![Some(WorkerName::parse(base).map_err(to_config)?)]),
        Some(base) => (0..count)
            .map(|i| WorkerName::indexed(base, i).map(Some).map_err(to_config))
            .collect(),
    }
}

/// Orchestrates worker construction and fan-out
pub struct Launcher {
    resolver: QueueResolver,
    registry: WorkerRegistry,
    connections: Arc<dyn ConnectionFactory>,
    executor: Arc<dyn JobExecutor>,
    spawner: Arc<dyn ProcessSpawner>,
    names: Arc<dyn NameProvider>,
    time_provider: Arc<dyn TimeProvider>,
    settings: WorkerSettings,
    failure_policy: ConnectionFailurePolicy,
}

impl Launcher {
    pub fn new(
        resolver: QueueResolver,
        registry: WorkerRegistry,
        connections: Arc<dyn ConnectionFactory>,
        executor: Arc<dyn JobExecutor>,
        spawner: Arc<dyn ProcessSpawner>,
        names: Arc<dyn NameProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            resolver,
            registry,
            connections,
            executor,
            spawner,
            names,
            time_provider,
            settings: WorkerSettings::default(),
            failure_policy: ConnectionFailurePolicy::default(),
        }
    }

    pub fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_failure_policy(mut self, policy: ConnectionFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Check everything that can be checked without the broker.
    ///
    /// Returns the broker target of the requested queues.
    pub fn validate(&self, request: &LaunchRequest) -> Result<BrokerTarget> {
        if request.count == 0 {
            return Err(AppError::Configuration(
                "Worker count must be at least 1".to_string(),
            ));
        }
        self.registry.resolve(&request.worker_class)?;
        derive_worker_names(request.name.as_deref(), request.count)?;
        let target = self.resolver.target_for(&request.queues)?;
        self.connections.check_target(&target)?;
        Ok(target)
    }

    /// Launch according to `request`.
    ///
    /// `count == 1` runs the worker on the calling task until its loop exits;
    /// `count > 1` starts processes and returns immediately.
    pub async fn launch(
        &self,
        request: &LaunchRequest,
        shutdown: ShutdownToken,
    ) -> Result<LaunchOutcome> {
        let target = self.validate(request)?;
        if request.count == 1 {
            self.run_worker(request, &target, shutdown).await
        } else {
            self.spawn_workers(request).map(LaunchOutcome::Spawned)
        }
    }

    async fn run_worker(
        &self,
        request: &LaunchRequest,
        target: &BrokerTarget,
        shutdown: ShutdownToken,
    ) -> Result<LaunchOutcome> {
        match self.run_single(request, target, shutdown).await {
            Err(e) if e.is_connection() => self.connection_failed(e),
            other => other,
        }
    }

    async fn run_single(
        &self,
        request: &LaunchRequest,
        target: &BrokerTarget,
        shutdown: ShutdownToken,
    ) -> Result<LaunchOutcome> {
        let name = match request.name.as_deref() {
            Some(name) => {
                WorkerName::parse(name).map_err(|e| AppError::Configuration(e.to_string()))?
            }
            None => self
                .names
                .worker_name()
                .map_err(|e| AppError::Internal(e.to_string()))?,
        };

        let connection = self.connections.connect(target).await?;
        info!(broker = %target, connection = %connection.id(), "Connected to broker");

        let queues = self.resolver.resolve(&request.queues, connection)?;
        let worker = self.registry.build(
            &request.worker_class,
            WorkerSpec {
                name: name.clone(),
                queues,
                executor: self.executor.clone(),
                time_provider: self.time_provider.clone(),
                settings: self.settings.clone(),
            },
        )?;

        let summary = worker
            .run(RunMode::from_burst(request.burst), shutdown)
            .await?;
        Ok(LaunchOutcome::Completed {
            worker: name,
            summary,
        })
    }

    fn connection_failed(&self, e: AppError) -> Result<LaunchOutcome> {
        error!(error = %e, policy = ?self.failure_policy, "Broker connection failed");
        match self.failure_policy {
            ConnectionFailurePolicy::Report => Ok(LaunchOutcome::ConnectionFailed {
                reason: e.to_string(),
            }),
            ConnectionFailurePolicy::Fail => Err(e),
        }
    }

    fn spawn_workers(&self, request: &LaunchRequest) -> Result<ProcessGroup> {
        let names = derive_worker_names(request.name.as_deref(), request.count)?;
        let mut processes = Vec::with_capacity(names.len());
        let mut last_error = None;

        for (index, name) in names.into_iter().enumerate() {
            let invocation = WorkerInvocation {
                queues: request.queues.clone(),
                worker_class: request.worker_class.clone(),
                name: name.map(|n| n.to_string()),
                burst: request.burst,
            };
            match self.spawner.spawn(&invocation) {
                Ok(process) => {
                    info!(
                        index,
                        pid = process.pid(),
                        name = ?invocation.name,
                        "Spawned worker process"
                    );
                    processes.push(process);
                }
                Err(e) => {
                    warn!(index, error = %e, "Failed to spawn worker process");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if processes.is_empty() => Err(e),
            _ => Ok(ProcessGroup {
                processes,
                requested: request.count,
            }),
        }
    }
}
