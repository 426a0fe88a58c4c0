// Worker - Job execution loop

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::{execute_guarded_async, execute_isolated, panic_message, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::queues::{shared_connection, Queue};
use crate::domain::{Job, RunMode, WorkerName, WorkerState};
use crate::error::Result;
use crate::port::{
    Connection, ExecutionError, ExecutionResult, ExecutionStatus, JobContext, JobExecutor,
    TimeProvider, WorkerRegistration,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Capability set every worker implementation provides
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &WorkerName;

    /// Connection shared by all bound queues
    fn connection(&self) -> &Arc<dyn Connection>;

    /// Bound queues in priority order
    fn queues(&self) -> &[Queue];

    /// Dequeue and execute jobs until the queues drain (burst) or
    /// `shutdown` fires (continuous).
    ///
    /// Broker errors end the loop and are returned; job failures are
    /// recorded on the job and do not.
    async fn run(&self, mode: RunMode, shutdown: ShutdownToken) -> Result<RunSummary>;
}

/// Tunables of the dequeue loop
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

impl WorkerSettings {
    /// Registrations older than this belong to dead workers
    fn stale_after_ms(&self) -> i64 {
        let grace = self.heartbeat_interval * HEARTBEAT_GRACE_INTERVALS;
        (self.job_timeout + grace).as_millis() as i64
    }
}

/// Everything needed to construct a worker
#[derive(Clone)]
pub struct WorkerSpec {
    pub name: WorkerName,
    pub queues: Vec<Queue>,
    pub executor: Arc<dyn JobExecutor>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub settings: WorkerSettings,
}

/// Counters reported when a run loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Where a job runs relative to the dequeue loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStyle {
    /// On its own Tokio task; the loop awaits it before dequeuing again
    Isolated,
    /// Directly on the loop task
    Inline,
}

/// Worker bound to an ordered list of queues sharing one connection
pub struct QueueWorker {
    name: WorkerName,
    queues: Vec<Queue>,
    connection: Arc<dyn Connection>,
    executor: Arc<dyn JobExecutor>,
    time_provider: Arc<dyn TimeProvider>,
    settings: WorkerSettings,
    style: ExecutionStyle,
    state: Mutex<WorkerState>,
}

impl QueueWorker {
    /// Fails with `AppError::Configuration` if the queues do not share a connection
    pub fn new(spec: WorkerSpec, style: ExecutionStyle) -> Result<Self> {
        let connection = shared_connection(&spec.queues)?;
        Ok(Self {
            name: spec.name,
            queues: spec.queues,
            connection,
            executor: spec.executor,
            time_provider: spec.time_provider,
            settings: spec.settings,
            style,
            state: Mutex::new(WorkerState::Idle),
        })
    }

    /// Current loop state
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|q| q.name().to_string()).collect()
    }

    async fn register(&self) -> Result<()> {
        let now = self.time_provider.now_millis();
        let registration = WorkerRegistration {
            name: self.name.to_string(),
            pid: std::process::id(),
            queues: self.queue_names(),
            state: WorkerState::Idle,
            current_job: None,
            birth: now,
            last_heartbeat: now,
        };
        self.connection
            .register_worker(&registration, self.settings.stale_after_ms())
            .await
    }

    /// Check queues in priority order; the first queue with a job wins
    async fn dequeue_next(&self) -> Result<Option<Job>> {
        self.set_state(WorkerState::Dequeuing);
        for queue in &self.queues {
            if let Some(job) = queue.dequeue(&self.name).await? {
                debug!(
                    worker = %self.name,
                    queue = %queue.name(),
                    job_id = %job.id,
                    "Dequeued job"
                );
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn work(&self, mode: RunMode, shutdown: &mut ShutdownToken) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut last_heartbeat = Instant::now();

        loop {
            if shutdown.is_shutdown() {
                info!(worker = %self.name, "Worker shutting down");
                break;
            }

            match self.dequeue_next().await? {
                Some(job) => {
                    if self.perform(job).await? {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                    last_heartbeat = Instant::now();
                }
                None if mode.is_burst() => {
                    info!(worker = %self.name, "All queues empty, burst finished");
                    break;
                }
                None => {
                    self.set_state(WorkerState::Idle);
                    if last_heartbeat.elapsed() >= self.settings.heartbeat_interval {
                        self.connection
                            .update_worker(self.name.as_str(), WorkerState::Idle, None)
                            .await?;
                        last_heartbeat = Instant::now();
                    }
                    tokio::select! {
                        _ = sleep(self.settings.poll_interval) => {},
                        _ = shutdown.wait() => {
                            info!(worker = %self.name, "Worker interrupted during idle");
                            break;
                        }
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Execute one claimed job and acknowledge it. Returns true on success.
    async fn perform(&self, mut job: Job) -> Result<bool> {
        self.set_state(WorkerState::Executing);
        self.connection
            .update_worker(self.name.as_str(), WorkerState::Executing, Some(&job.id))
            .await?;

        info!(
            worker = %self.name,
            queue = %job.queue,
            job_id = %job.id,
            job_type = %job.job_type.as_str(),
            "Processing job"
        );

        let ctx = JobContext {
            job: Arc::new(job.clone()),
            connection: self.connection.clone(),
            worker_name: self.name.clone(),
        };
        let outcome = self.execute(ctx).await;

        let now = self.time_provider.now_millis();
        let succeeded = match outcome {
            Ok(result) if result.status == ExecutionStatus::Success => {
                job.complete(now)?;
                info!(job_id = %job.id, duration_ms = %result.duration_ms, "Job completed");
                true
            }
            Ok(result) => {
                let reason = describe_failure(&result);
                error!(job_id = %job.id, reason = %reason, "Job failed");
                job.fail(now, reason)?;
                false
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Job failed");
                job.fail(now, e.to_string())?;
                false
            }
        };

        self.connection.update(&job).await?;
        self.connection
            .update_worker(self.name.as_str(), WorkerState::Idle, None)
            .await?;
        self.set_state(WorkerState::Idle);
        Ok(succeeded)
    }

    async fn execute(
        &self,
        ctx: JobContext,
    ) -> std::result::Result<ExecutionResult, ExecutionError> {
        let executor = Arc::clone(&self.executor);
        let job_timeout = self.settings.job_timeout;
        let bounded =
            async move { tokio::time::timeout(job_timeout, executor.execute(&ctx)).await };

        let guarded = match self.style {
            ExecutionStyle::Isolated => execute_isolated(bounded).await,
            ExecutionStyle::Inline => execute_guarded_async(bounded).await,
        };

        match guarded {
            PanicGuardResult::Success(Ok(result)) => result,
            PanicGuardResult::Success(Err(_elapsed)) => {
                Err(ExecutionError::Timeout(job_timeout.as_millis() as i64))
            }
            PanicGuardResult::Panicked(msg) => Err(ExecutionError::Panicked(msg)),
        }
    }
}

fn describe_failure(result: &ExecutionResult) -> String {
    let mut reason = match result.exit_code {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    };
    if let Some(stderr) = result.stderr.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        reason.push_str(": ");
        reason.push_str(stderr);
    }
    reason
}

#[async_trait]
impl Worker for QueueWorker {
    fn name(&self) -> &WorkerName {
        &self.name
    }

    fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    fn queues(&self) -> &[Queue] {
        &self.queues
    }

    async fn run(&self, mode: RunMode, mut shutdown: ShutdownToken) -> Result<RunSummary> {
        info!(
            worker = %self.name,
            queues = ?self.queue_names(),
            mode = ?mode,
            style = ?self.style,
            "Worker started"
        );
        self.register().await?;

        let result = self.work(mode, &mut shutdown).await;
        self.set_state(WorkerState::Terminated);

        if let Err(e) = self.connection.unregister_worker(self.name.as_str()).await {
            warn!(worker = %self.name, error = %e, "Failed to unregister worker");
        }

        match &result {
            Ok(summary) => info!(
                worker = %self.name,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Worker stopped"
            ),
            Err(e) => error!(worker = %self.name, error = %e, "Worker stopped on error"),
        }
        result
    }
}
