// ID Provider Port (for deterministic testing)

use crate::domain::error::Result;
use crate::domain::WorkerName;

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique job ID
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Generates a worker name when none was given
pub trait NameProvider: Send + Sync {
    fn worker_name(&self) -> Result<WorkerName>;
}

impl NameProvider for UuidProvider {
    fn worker_name(&self) -> Result<WorkerName> {
        WorkerName::parse(uuid::Uuid::new_v4().simple().to_string())
    }
}
