// Worker constants (no magic values)
use std::time::Duration;

/// Sleep between polls when every queue is empty (continuous mode)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for a single job execution
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(180);

/// How often an idle worker refreshes its broker registration
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Missed heartbeats after which a registration counts as dead
pub const HEARTBEAT_GRACE_INTERVALS: u32 = 3;
