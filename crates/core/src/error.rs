// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Bad queue lists, unknown queue names, invalid counts, name clashes.
    /// Raised before any worker starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Worker implementation identifier cannot be resolved.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Broker unreachable at connect or dequeue time.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_connection(&self) -> bool {
        matches!(self, AppError::Connection(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite
// by mapping into AppError::Connection / AppError::Database.
