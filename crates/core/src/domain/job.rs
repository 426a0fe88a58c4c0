// Job Domain Model

use serde::{Deserialize, Serialize};

/// Job ID (UUID v4)
pub type JobId = String;

/// Job State
///
/// `Queued -> Started -> Finished | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Started,
    Finished,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Started => "STARTED",
            JobState::Finished => "FINISHED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(JobState::Queued),
            "STARTED" => Some(JobState::Started),
            "FINISHED" => Some(JobState::Finished),
            "FAILED" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job Type (free-form tag chosen by the producer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobType(String);

impl JobType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Job Payload (JSON serializable, opaque to the worker loop)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub state: JobState,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    /// Worker that claimed the job
    pub worker_name: Option<String>,
    /// Failure description, set when the job ends in `Failed`
    pub error: Option<String>,
}

impl Job {
    /// Create a new queued job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `queue` - Queue name
    /// * `job_type` - Job type
    /// * `payload` - Job payload
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        queue: impl Into<String>,
        job_type: JobType,
        payload: JobPayload,
    ) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            job_type,
            payload,
            state: JobState::Queued,
            created_at,
            started_at: None,
            finished_at: None,
            worker_name: None,
            error: None,
        }
    }

    /// Create a test job with deterministic ID and timestamp.
    ///
    /// IDs come from a process-wide counter (test-1, test-2, ...) and
    /// timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: only for tests. Production code injects ID and time via providers.
    pub fn new_test(queue: impl Into<String>, job_type: &str, payload: serde_json::Value) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            (counter * 1000) as i64,
            queue,
            JobType::new(job_type),
            JobPayload::new(payload),
        )
    }

    /// Transition to Started, recording the claiming worker
    pub fn start(
        &mut self,
        now_millis: i64,
        worker_name: impl Into<String>,
    ) -> crate::domain::error::Result<()> {
        if self.state != JobState::Queued {
            return Err(self.invalid_transition(JobState::Started));
        }
        self.state = JobState::Started;
        self.started_at = Some(now_millis);
        self.worker_name = Some(worker_name.into());
        Ok(())
    }

    /// Transition to Finished
    pub fn complete(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if self.state != JobState::Started {
            return Err(self.invalid_transition(JobState::Finished));
        }
        self.state = JobState::Finished;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Failed with the failure description
    pub fn fail(
        &mut self,
        now_millis: i64,
        error: impl Into<String>,
    ) -> crate::domain::error::Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid_transition(JobState::Failed));
        }
        self.state = JobState::Failed;
        self.finished_at = Some(now_millis);
        self.error = Some(error.into());
        Ok(())
    }

    fn invalid_transition(&self, to: JobState) -> crate::domain::DomainError {
        crate::domain::DomainError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}
