// Port Layer - Interfaces for external dependencies

pub mod connection;
pub mod id_provider; // For deterministic testing
pub mod job_executor;
pub mod process_spawner;
pub mod time_provider;

// Re-exports
pub use connection::{BrokerTarget, Connection, ConnectionFactory, WorkerRegistration};
pub use id_provider::{IdProvider, NameProvider};
pub use job_executor::{ExecutionError, ExecutionResult, ExecutionStatus, JobContext, JobExecutor};
pub use process_spawner::{ProcessSpawner, WorkerInvocation, WorkerProcess};
pub use time_provider::TimeProvider;
