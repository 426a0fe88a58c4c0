// Worker Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Worker identity, unique among running workers of one broker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerName(String);

impl WorkerName {
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::InvalidWorkerName {
                name,
                reason: "worker name is empty".to_string(),
            });
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::InvalidWorkerName {
                name,
                reason: "worker name must not contain whitespace".to_string(),
            });
        }
        Ok(Self(name))
    }

    /// Name of the `index`-th worker spawned from `base`: `{base}.{index}`
    pub fn indexed(base: &str, index: usize) -> Result<Self> {
        Self::parse(format!("{}.{}", base, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How long a worker keeps dequeuing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Wait for new jobs until stopped from outside
    Continuous,
    /// Stop as soon as every bound queue is empty
    Burst,
}

impl RunMode {
    pub fn from_burst(burst: bool) -> Self {
        if burst {
            RunMode::Burst
        } else {
            RunMode::Continuous
        }
    }

    pub fn is_burst(&self) -> bool {
        matches!(self, RunMode::Burst)
    }
}

/// Worker loop state
///
/// Continuous: `Idle -> Dequeuing -> Executing -> Idle`
/// Burst:      `Idle -> Dequeuing -> {Executing -> Idle | Terminated}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Idle,
    Dequeuing,
    Executing,
    Terminated,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "IDLE",
            WorkerState::Dequeuing => "DEQUEUING",
            WorkerState::Executing => "EXECUTING",
            WorkerState::Terminated => "TERMINATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(WorkerState::Idle),
            "DEQUEUING" => Some(WorkerState::Dequeuing),
            "EXECUTING" => Some(WorkerState::Executing),
            "TERMINATED" => Some(WorkerState::Terminated),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
