// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid queue name '{name}': {reason}")]
    InvalidQueueName { name: String, reason: String },

    #[error("Invalid worker name '{name}': {reason}")]
    InvalidWorkerName { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
