// Worker process spawner
// Re-executes the worker binary once per spawned worker

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info};

use stevedore_core::error::{AppError, Result};
use stevedore_core::port::{ProcessSpawner, WorkerInvocation, WorkerProcess};

/// Starts each worker as `program <shared args> --count 1 ... -- <queues>`
pub struct ExecutableSpawner {
    program: PathBuf,
    shared_args: Vec<String>,
}

impl ExecutableSpawner {
    /// # Arguments
    /// * `program` - Worker executable
    /// * `shared_args` - Arguments every child receives first (config, broker, policy)
    pub fn new(program: impl Into<PathBuf>, shared_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            shared_args,
        }
    }

    /// Spawner re-running the current executable
    pub fn current_exe(shared_args: Vec<String>) -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, shared_args))
    }

    /// Full argument list for one child
    pub fn command_args(&self, invocation: &WorkerInvocation) -> Vec<String> {
        let mut args = self.shared_args.clone();
        args.extend([
            "--count".to_string(),
            "1".to_string(),
            "--worker-class".to_string(),
            invocation.worker_class.clone(),
        ]);
        if let Some(name) = &invocation.name {
            args.extend(["--name".to_string(), name.clone()]);
        }
        if invocation.burst {
            args.push("--burst".to_string());
        }
        args.push("--".to_string());
        args.extend(invocation.queues.iter().cloned());
        args
    }
}

impl ProcessSpawner for ExecutableSpawner {
    fn spawn(&self, invocation: &WorkerInvocation) -> Result<Box<dyn WorkerProcess>> {
        let args = self.command_args(invocation);
        debug!(program = %self.program.display(), args = ?args, "Spawning worker process");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()?;

        Ok(Box::new(ChildProcess {
            child,
            name: invocation.name.clone(),
        }))
    }
}

/// Spawned OS process
struct ChildProcess {
    child: Child,
    name: Option<String>,
}

impl WorkerProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn is_running(&mut self) -> bool {
        // try_wait also reaps the child once it has exited
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        info!(pid = self.pid(), "Sending SIGTERM to worker process");

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = i32::try_from(self.pid())
                .map_err(|_| AppError::Internal(format!("pid {} out of range", self.pid())))?;
            match kill(Pid::from_raw(pid), Signal::SIGTERM) {
                // Already gone
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(AppError::Internal(format!("SIGTERM failed: {}", e))),
            }
        }

        #[cfg(not(unix))]
        {
            self.child
                .kill()
                .map_err(|e| AppError::Internal(format!("kill failed: {}", e)))
        }
    }
}
