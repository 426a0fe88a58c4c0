// Job Executor Port
// Abstraction for running a dequeued job (subprocess or in-process)

use crate::domain::{Job, WorkerName};
use crate::port::Connection;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Everything a job may need while it runs.
///
/// The connection travels with the job instead of living in global state,
/// so job code that talks to the broker uses the worker's own connection.
#[derive(Clone)]
pub struct JobContext {
    pub job: Arc<Job>,
    pub connection: Arc<dyn Connection>,
    pub worker_name: WorkerName,
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job.id)
            .field("connection", &self.connection.id())
            .field("worker_name", &self.worker_name)
            .finish()
    }
}

/// Result of job execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub duration_ms: i64,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Job timed out after {0}ms")]
    Timeout(i64),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Job Executor trait
///
/// Implementations:
/// - SubprocessExecutor (infra-system): runs the payload as a child process
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Execute a job and return the result
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the job cannot be started
    /// - ExecutionError::InvalidPayload if the job payload is malformed
    async fn execute(&self, ctx: &JobContext) -> Result<ExecutionResult, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock executor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Return a non-success status
        NonZeroExit(i32),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Sleep before succeeding
        Sleep(Duration),
    }

    /// Mock Job Executor recording the order in which jobs ran
    pub struct MockJobExecutor {
        default: MockBehavior,
        per_job_type: Mutex<HashMap<String, MockBehavior>>,
        executed: Mutex<Vec<String>>,
        connections: Mutex<Vec<String>>,
    }

    impl MockJobExecutor {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                default: behavior,
                per_job_type: Mutex::new(HashMap::new()),
                executed: Mutex::new(Vec::new()),
                connections: Mutex::new(Vec::new()),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        /// Override behavior for one job type
        pub fn on_job_type(self, job_type: &str, behavior: MockBehavior) -> Self {
            self.per_job_type
                .lock()
                .unwrap()
                .insert(job_type.to_string(), behavior);
            self
        }

        /// Job IDs in execution order
        pub fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }

        /// Connection IDs seen by each execution
        pub fn connections(&self) -> Vec<String> {
            self.connections.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.executed.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobExecutor for MockJobExecutor {
        async fn execute(&self, ctx: &JobContext) -> Result<ExecutionResult, ExecutionError> {
            self.executed.lock().unwrap().push(ctx.job.id.clone());
            self.connections
                .lock()
                .unwrap()
                .push(ctx.connection.id().to_string());

            let behavior = self
                .per_job_type
                .lock()
                .unwrap()
                .get(ctx.job.job_type.as_str())
                .cloned()
                .unwrap_or_else(|| self.default.clone());

            let ok = |status, exit_code| ExecutionResult {
                status,
                duration_ms: 1,
                exit_code: Some(exit_code),
                stdout: Some("mock output".to_string()),
                stderr: None,
            };

            match behavior {
                MockBehavior::Success => Ok(ok(ExecutionStatus::Success, 0)),
                MockBehavior::Fail(msg) => Err(ExecutionError::SpawnFailed(msg)),
                MockBehavior::NonZeroExit(code) => Ok(ok(ExecutionStatus::Failed, code)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(ok(ExecutionStatus::Success, 0))
                }
            }
        }
    }
}
