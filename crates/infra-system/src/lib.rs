// Stevedore Infrastructure - System Adapters
// Implements: JobExecutor, ProcessSpawner, NameProvider

pub mod host_name;
pub mod process_spawner;
pub mod subprocess_executor;

pub use host_name::HostNameProvider;
pub use process_spawner::ExecutableSpawner;
pub use subprocess_executor::{SubprocessExecutor, DEFAULT_ENV_ALLOWLIST};
