// Enqueue Use Case

use crate::application::queues::Queue;
use crate::domain::{Job, JobPayload, JobType};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const MAX_JOB_TYPE_LEN: usize = 128;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub job_type: String,
    pub payload: serde_json::Value,
}

/// Validate request
pub fn validate_request(req: &EnqueueRequest) -> Result<()> {
    if req.job_type.trim().is_empty() {
        return Err(AppError::Configuration(
            "Job type cannot be empty".to_string(),
        ));
    }
    if req.job_type.len() > MAX_JOB_TYPE_LEN {
        return Err(AppError::Configuration(format!(
            "Job type too long (max {} characters)",
            MAX_JOB_TYPE_LEN
        )));
    }
    Ok(())
}

/// Puts new jobs on queues
pub struct EnqueueService {
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl EnqueueService {
    pub fn new(id_provider: Arc<dyn IdProvider>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            id_provider,
            time_provider,
        }
    }

    /// Append a job to the tail of `queue`. Returns the stored job.
    pub async fn enqueue(&self, queue: &Queue, req: EnqueueRequest) -> Result<Job> {
        validate_request(&req)?;

        let job = Job::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            queue.name(),
            JobType::new(req.job_type),
            JobPayload::new(req.payload),
        );
        queue.enqueue(&job).await?;

        debug!(queue = %queue.name(), job_id = %job.id, "Enqueued job");
        Ok(job)
    }
}
