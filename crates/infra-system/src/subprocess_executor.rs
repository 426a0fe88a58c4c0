// Subprocess executor implementation
// reason: tokio for async process management
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

use stevedore_core::port::{
    ExecutionError, ExecutionResult, ExecutionStatus, JobContext, JobExecutor, TimeProvider,
};

/// Variables a job sees from the worker's environment unless configured otherwise
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "USER"];

/// Job payload understood by the executor
#[derive(Debug, Clone, Deserialize)]
struct CommandPayload {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default = "default_working_dir")]
    working_dir: String,
}

fn default_working_dir() -> String {
    ".".to_string()
}

/// Subprocess executor
/// Spawns isolated child processes with environment allowlisting
pub struct SubprocessExecutor {
    time_provider: Arc<dyn TimeProvider>,
    env_allowlist: Vec<String>,
}

impl SubprocessExecutor {
    /// Create a new subprocess executor
    ///
    /// # Arguments
    /// * `time_provider` - Time provider for duration tracking
    /// * `env_allowlist` - Environment variables a job may see (inherited or from its payload)
    ///
    /// # Example
    /// ```ignore
    /// let executor = SubprocessExecutor::new(
    ///     Arc::new(SystemTimeProvider),
    ///     vec!["PATH".to_string(), "HOME".to_string(), "USER".to_string()],
    /// );
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>, env_allowlist: Vec<String>) -> Self {
        Self {
            time_provider,
            env_allowlist,
        }
    }

    /// Filter environment variables to allowlist only
    fn filter_env<'a, I>(&self, env: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        env.into_iter()
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Environment of the child: allowlisted inherited and payload variables,
    /// then the job context (never filtered)
    fn build_env(&self, ctx: &JobContext, payload: &CommandPayload) -> HashMap<String, String> {
        let inherited: HashMap<String, String> = std::env::vars().collect();
        let mut env = self.filter_env(&inherited);
        env.extend(self.filter_env(&payload.env));

        env.insert("STEVEDORE_JOB_ID".to_string(), ctx.job.id.clone());
        env.insert("STEVEDORE_QUEUE".to_string(), ctx.job.queue.clone());
        env.insert(
            "STEVEDORE_WORKER_NAME".to_string(),
            ctx.worker_name.to_string(),
        );
        env.insert(
            "STEVEDORE_BROKER_URL".to_string(),
            ctx.connection.target().url.clone(),
        );
        env
    }

    /// Parse job payload to extract execution parameters
    fn parse_payload(ctx: &JobContext) -> Result<CommandPayload, ExecutionError> {
        let payload: CommandPayload = serde_json::from_value(ctx.job.payload.as_value().clone())
            .map_err(|e| ExecutionError::InvalidPayload(e.to_string()))?;
        if payload.command.trim().is_empty() {
            return Err(ExecutionError::InvalidPayload(
                "'command' cannot be empty".to_string(),
            ));
        }
        Ok(payload)
    }

    /// Spawn child process and wait for output.
    ///
    /// The child is killed if this future is dropped (e.g. on job timeout).
    async fn spawn_and_wait(
        &self,
        payload: &CommandPayload,
        env: &HashMap<String, String>,
    ) -> Result<std::process::Output, ExecutionError> {
        let child = Command::new(&payload.command)
            .args(&payload.args)
            .env_clear()
            .envs(env)
            .current_dir(&payload.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {}", payload.command, e)))?;

        child
            .wait_with_output()
            .await
            .map_err(|e| ExecutionError::IoError(e.to_string()))
    }

    /// Build execution result from process output
    fn build_result(&self, output: std::process::Output, duration_ms: i64) -> ExecutionResult {
        let status = if output.status.success() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };

        ExecutionResult {
            status,
            exit_code: output.status.code(),
            duration_ms,
            stdout: Some(String::from_utf8_lossy(&output.stdout).to_string()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        }
    }
}

#[async_trait]
impl JobExecutor for SubprocessExecutor {
    async fn execute(&self, ctx: &JobContext) -> Result<ExecutionResult, ExecutionError> {
        let payload = Self::parse_payload(ctx)?;
        let env = self.build_env(ctx, &payload);
        let start_time = self.time_provider.now_millis();

        info!(
            job_id = %ctx.job.id,
            command = %payload.command,
            args = ?payload.args,
            working_dir = %payload.working_dir,
            "Starting subprocess execution"
        );

        let output = self.spawn_and_wait(&payload, &env).await?;
        let duration_ms = self.time_provider.now_millis() - start_time;
        let result = self.build_result(output, duration_ms);

        info!(
            job_id = %ctx.job.id,
            duration_ms = %duration_ms,
            exit_code = ?result.exit_code,
            status = ?result.status,
            "Subprocess execution completed"
        );

        Ok(result)
    }
}
