// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod queue;
pub mod worker;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobPayload, JobState, JobType};
pub use queue::{QueueName, DEFAULT_QUEUE};
pub use worker::{RunMode, WorkerName, WorkerState};
