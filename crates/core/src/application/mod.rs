// Application Layer - Use Cases and Business Logic

pub mod enqueue;
pub mod launcher;
pub mod queues;
pub mod registry;
pub mod worker;

// Re-exports
pub use enqueue::{EnqueueRequest, EnqueueService};
pub use launcher::{
    ConnectionFailurePolicy, LaunchOutcome, LaunchRequest, Launcher, ProcessGroup,
};
pub use queues::{shared_connection, Queue, QueueCatalog, QueueResolver};
pub use registry::{WorkerRegistry, DEFAULT_WORKER_CLASS, SIMPLE_WORKER_CLASS};
pub use worker::{
    shutdown_channel, ExecutionStyle, QueueWorker, RunSummary, ShutdownSender, ShutdownToken,
    Worker, WorkerSettings, WorkerSpec,
};
