// Process Spawner Port
// Starts independent worker processes for multi-worker launches

use crate::error::Result;

/// Arguments handed to one spawned worker process.
///
/// The child runs the single-worker path with these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub queues: Vec<String>,
    pub worker_class: String,
    /// Derived `{base}.{index}` name, or `None` to let the child generate one
    pub name: Option<String>,
    pub burst: bool,
}

/// Handle to a spawned worker process
pub trait WorkerProcess: Send {
    fn pid(&self) -> u32;

    /// Name the process was started with, if any
    fn name(&self) -> Option<&str>;

    /// True while the process has not exited
    fn is_running(&mut self) -> bool;

    /// Ask the process to stop gracefully (SIGTERM on unix)
    fn terminate(&mut self) -> Result<()>;
}

/// Spawns worker processes
pub trait ProcessSpawner: Send + Sync {
    /// Start one worker process. Does not wait for it.
    fn spawn(&self, invocation: &WorkerInvocation) -> Result<Box<dyn WorkerProcess>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Fake process; stays "running" until terminated
    pub struct FakeProcess {
        pid: u32,
        name: Option<String>,
        running: Arc<AtomicBool>,
    }

    impl WorkerProcess for FakeProcess {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn name(&self) -> Option<&str> {
            self.name.as_deref()
        }

        fn is_running(&mut self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn terminate(&mut self) -> Result<()> {
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Records every invocation instead of starting processes
    #[derive(Default)]
    pub struct RecordingSpawner {
        invocations: Mutex<Vec<WorkerInvocation>>,
        handles: Mutex<Vec<Arc<AtomicBool>>>,
        failing: Vec<usize>,
    }

    impl RecordingSpawner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Spawner whose `index`-th spawn attempts (0-based) fail
        pub fn failing_on(indexes: &[usize]) -> Self {
            Self {
                failing: indexes.to_vec(),
                ..Self::default()
            }
        }

        pub fn invocations(&self) -> Vec<WorkerInvocation> {
            self.invocations.lock().unwrap().clone()
        }

        /// Simulate the `index`-th spawned process exiting on its own
        pub fn exit(&self, index: usize) {
            if let Some(flag) = self.handles.lock().unwrap().get(index) {
                flag.store(false, Ordering::SeqCst);
            }
        }
    }

    impl ProcessSpawner for RecordingSpawner {
        fn spawn(&self, invocation: &WorkerInvocation) -> Result<Box<dyn WorkerProcess>> {
            let mut invocations = self.invocations.lock().unwrap();
            let attempt = invocations.len();
            invocations.push(invocation.clone());
            if self.failing.contains(&attempt) {
                return Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "spawn refused",
                )));
            }
            let running = Arc::new(AtomicBool::new(true));
            self.handles.lock().unwrap().push(running.clone());
            Ok(Box::new(FakeProcess {
                pid: 10_000 + invocations.len() as u32,
                name: invocation.name.clone(),
                running,
            }))
        }
    }
}
