//! Shared types used across the swarm crates.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned by a scheduler backend at submission time.
///
/// For Slurm this is the numeric job id; for Run:ai it is the job name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle of a job as observed from the cluster.
///
/// Never stored: computed on demand from a backend query and discarded
/// after the poll cycle that asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Accepted by the cluster but not yet running.
    Submitted,
    /// Running on a node.
    Running,
    /// Running, but the cluster has not published an address for it yet.
    Unreachable,
    /// Finished, failed, or cancelled. Never comes back.
    Terminated,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        self == JobState::Terminated
    }

    /// Occupying a node, reachable or not.
    pub fn is_running(self) -> bool {
        matches!(self, JobState::Running | JobState::Unreachable)
    }
}

/// Inference engine launched by each job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Hugging Face text-generation-inference.
    #[default]
    Tgi,
    /// vLLM's api server.
    Vllm,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Tgi => "tgi",
            EngineKind::Vllm => "vllm",
        }
    }

    /// Path that clients must append to reach the generation route.
    pub fn endpoint_suffix(self) -> Option<&'static str> {
        match self {
            EngineKind::Tgi => None,
            EngineKind::Vllm => Some("/generate"),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tgi" => Ok(EngineKind::Tgi),
            "vllm" => Ok(EngineKind::Vllm),
            other => Err(format!("unknown inference engine: {other} (expected tgi or vllm)")),
        }
    }
}

/// Cluster manager that runs the jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// Slurm batch queue (`sbatch` / `squeue` / `scancel`).
    #[default]
    Slurm,
    /// Run:ai on Kubernetes (`kubectl` / `runai`).
    Runai,
}

impl SchedulerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerKind::Slurm => "slurm",
            SchedulerKind::Runai => "runai",
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slurm" => Ok(SchedulerKind::Slurm),
            "runai" => Ok(SchedulerKind::Runai),
            other => Err(format!("unknown job scheduler: {other} (expected slurm or runai)")),
        }
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
