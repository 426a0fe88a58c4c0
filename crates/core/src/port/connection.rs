// Broker Connection Port (Interface)

use crate::domain::{Job, JobId, JobState, WorkerState};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a connection points to (e.g. `sqlite:///var/lib/stevedore/broker.db`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerTarget {
    pub url: String,
}

impl BrokerTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl std::fmt::Display for BrokerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Worker entry kept by the broker while a worker runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub name: String,
    pub pid: u32,
    pub queues: Vec<String>,
    pub state: WorkerState,
    pub current_job: Option<JobId>,
    pub birth: i64,          // epoch ms
    pub last_heartbeat: i64, // epoch ms
}

/// Live handle to the broker.
///
/// Exactly one per worker process. Queue handles of that process share it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identity of this connection; two queues share a connection iff ids match
    fn id(&self) -> &str;

    /// Broker this connection was opened against
    fn target(&self) -> &BrokerTarget;

    /// Add a job to the tail of its queue
    async fn enqueue(&self, job: &Job) -> Result<()>;

    /// Atomically claim the oldest queued job of `queue` for `worker`.
    /// The returned job is already `Started`.
    async fn pop_next(&self, queue: &str, worker: &str) -> Result<Option<Job>>;

    /// Persist the job's current state (acknowledge finished / failed)
    async fn update(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Count jobs of a queue in a given state
    async fn count_by_state(&self, queue: &str, state: JobState) -> Result<i64>;

    /// Register a running worker.
    ///
    /// Fails with `AppError::Configuration` if a worker of the same name
    /// heartbeated within the last `stale_after_ms`; older entries are replaced.
    async fn register_worker(&self, registration: &WorkerRegistration, stale_after_ms: i64)
        -> Result<()>;

    /// Record state / current job and refresh the heartbeat
    async fn update_worker(
        &self,
        name: &str,
        state: WorkerState,
        current_job: Option<&str>,
    ) -> Result<()>;

    /// Remove the worker entry
    async fn unregister_worker(&self, name: &str) -> Result<()>;

    /// All registered workers
    async fn list_workers(&self) -> Result<Vec<WorkerRegistration>>;
}

/// Opens connections.
///
/// An unreachable broker is `AppError::Connection`; a target this factory
/// cannot serve at all is `AppError::Configuration`.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Reject targets this factory can never open. No I/O.
    fn check_target(&self, _target: &BrokerTarget) -> Result<()> {
        Ok(())
    }

    async fn connect(&self, target: &BrokerTarget) -> Result<Arc<dyn Connection>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::WorkerState;
    use crate::error::AppError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryState {
        queues: HashMap<String, VecDeque<JobId>>,
        jobs: HashMap<JobId, Job>,
        workers: HashMap<String, WorkerRegistration>,
    }

    /// In-memory broker connection
    pub struct InMemoryConnection {
        id: String,
        target: BrokerTarget,
        state: Mutex<InMemoryState>,
        unreachable: AtomicBool,
        pop_calls: AtomicUsize,
    }

    impl InMemoryConnection {
        pub fn new() -> Self {
            Self::with_target(BrokerTarget::new("memory://"))
        }

        pub fn with_target(target: BrokerTarget) -> Self {
            Self {
                id: uuid::Uuid::new_v4().to_string(),
                target,
                state: Mutex::new(InMemoryState::default()),
                unreachable: AtomicBool::new(false),
                pop_calls: AtomicUsize::new(0),
            }
        }

        /// Make every subsequent broker call fail with a connection error
        pub fn set_unreachable(&self, unreachable: bool) {
            self.unreachable.store(unreachable, Ordering::SeqCst);
        }

        /// Number of `pop_next` calls seen so far
        pub fn pop_calls(&self) -> usize {
            self.pop_calls.load(Ordering::SeqCst)
        }

        pub fn queued_len(&self, queue: &str) -> usize {
            let state = self.state.lock().unwrap();
            state.queues.get(queue).map(|q| q.len()).unwrap_or(0)
        }

        pub fn job(&self, id: &str) -> Option<Job> {
            self.state.lock().unwrap().jobs.get(id).cloned()
        }

        fn check_reachable(&self) -> Result<()> {
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(AppError::Connection(format!(
                    "Error connecting to {}: connection refused",
                    self.target
                )));
            }
            Ok(())
        }

        fn now_millis() -> i64 {
            chrono::Utc::now().timestamp_millis()
        }
    }

    impl Default for InMemoryConnection {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Connection for InMemoryConnection {
        fn id(&self) -> &str {
            &self.id
        }

        fn target(&self) -> &BrokerTarget {
            &self.target
        }

        async fn enqueue(&self, job: &Job) -> Result<()> {
            self.check_reachable()?;
            let mut state = self.state.lock().unwrap();
            state
                .queues
                .entry(job.queue.clone())
                .or_default()
                .push_back(job.id.clone());
            state.jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn pop_next(&self, queue: &str, worker: &str) -> Result<Option<Job>> {
            self.pop_calls.fetch_add(1, Ordering::SeqCst);
            self.check_reachable()?;
            let mut state = self.state.lock().unwrap();
            let id = match state.queues.get_mut(queue).and_then(|q| q.pop_front()) {
                Some(id) => id,
                None => return Ok(None),
            };
            let job = state
                .jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
            job.start(Self::now_millis(), worker)?;
            Ok(Some(job.clone()))
        }

        async fn update(&self, job: &Job) -> Result<()> {
            self.check_reachable()?;
            let mut state = self.state.lock().unwrap();
            match state.jobs.get_mut(&job.id) {
                Some(stored) => {
                    *stored = job.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("Job {} not found", job.id))),
            }
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
            self.check_reachable()?;
            Ok(self.state.lock().unwrap().jobs.get(id).cloned())
        }

        async fn count_by_state(&self, queue: &str, job_state: JobState) -> Result<i64> {
            self.check_reachable()?;
            let state = self.state.lock().unwrap();
            Ok(state
                .jobs
                .values()
                .filter(|j| j.queue == queue && j.state == job_state)
                .count() as i64)
        }

        async fn register_worker(
            &self,
            registration: &WorkerRegistration,
            stale_after_ms: i64,
        ) -> Result<()> {
            self.check_reachable()?;
            let mut state = self.state.lock().unwrap();
            if let Some(existing) = state.workers.get(&registration.name) {
                if Self::now_millis() - existing.last_heartbeat < stale_after_ms {
                    return Err(AppError::Configuration(format!(
                        "There exists an active worker named '{}' already",
                        registration.name
                    )));
                }
            }
            state
                .workers
                .insert(registration.name.clone(), registration.clone());
            Ok(())
        }

        async fn update_worker(
            &self,
            name: &str,
            worker_state: WorkerState,
            current_job: Option<&str>,
        ) -> Result<()> {
            self.check_reachable()?;
            let mut state = self.state.lock().unwrap();
            if let Some(entry) = state.workers.get_mut(name) {
                entry.state = worker_state;
                entry.current_job = current_job.map(str::to_string);
                entry.last_heartbeat = Self::now_millis();
            }
            Ok(())
        }

        async fn unregister_worker(&self, name: &str) -> Result<()> {
            self.check_reachable()?;
            self.state.lock().unwrap().workers.remove(name);
            Ok(())
        }

        async fn list_workers(&self) -> Result<Vec<WorkerRegistration>> {
            self.check_reachable()?;
            Ok(self.state.lock().unwrap().workers.values().cloned().collect())
        }
    }

    /// Factory handing out one shared in-memory connection (or refusing)
    pub struct InMemoryConnectionFactory {
        connection: Arc<InMemoryConnection>,
        refuse: AtomicBool,
        connect_calls: AtomicUsize,
    }

    impl InMemoryConnectionFactory {
        pub fn new(connection: Arc<InMemoryConnection>) -> Self {
            Self {
                connection,
                refuse: AtomicBool::new(false),
                connect_calls: AtomicUsize::new(0),
            }
        }

        pub fn refusing() -> Self {
            let factory = Self::new(Arc::new(InMemoryConnection::new()));
            factory.refuse.store(true, Ordering::SeqCst);
            factory
        }

        pub fn connect_calls(&self) -> usize {
            self.connect_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConnectionFactory for InMemoryConnectionFactory {
        async fn connect(&self, target: &BrokerTarget) -> Result<Arc<dyn Connection>> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                return Err(AppError::Connection(format!(
                    "Error connecting to {}: connection refused",
                    target
                )));
            }
            Ok(self.connection.clone())
        }
    }
}
