//! Swarm lifecycle error types.

use std::path::PathBuf;

use swarm_balancer::BalancerError;
use swarm_core::{ConfigError, JobHandle};
use swarm_scheduler::SchedulerError;
use thiserror::Error;

/// Everything that can stop a swarm from reaching `Serving`.
///
/// Variants raised after submission carry the handles that were still
/// outstanding, so the operator knows which jobs to look at.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create logs folder {path}: {source}")]
    LogsFolder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read job template {path}: {source}")]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("job submission failed: {0}")]
    Submission(#[source] SchedulerError),

    #[error("job {handle} died while being awaited (logs: {hint}); outstanding: {}", join(.outstanding))]
    JobDied {
        handle: JobHandle,
        hint: String,
        outstanding: Vec<JobHandle>,
    },

    #[error("only {resolved} of {expected} endpoints resolved; outstanding: {}", join(.outstanding))]
    EndpointResolution {
        resolved: usize,
        expected: usize,
        outstanding: Vec<JobHandle>,
    },

    #[error("{stage} not ready after {attempts} attempts; outstanding: {}", join(.outstanding))]
    Unhealthy {
        stage: &'static str,
        attempts: u32,
        outstanding: Vec<JobHandle>,
    },

    #[error("load balancer failed: {source}; outstanding: {}", join(.outstanding))]
    Proxy {
        source: BalancerError,
        outstanding: Vec<JobHandle>,
    },

    #[error("cancelled while {stage}")]
    Cancelled { stage: &'static str },

    #[error("swarm was already started")]
    AlreadyStarted,
}

impl SwarmError {
    /// Handles that were still owned by the swarm when this error arose.
    pub fn outstanding(&self) -> &[JobHandle] {
        match self {
            SwarmError::JobDied { outstanding, .. }
            | SwarmError::EndpointResolution { outstanding, .. }
            | SwarmError::Unhealthy { outstanding, .. }
            | SwarmError::Proxy { outstanding, .. } => outstanding,
            _ => &[],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SwarmError::Cancelled { .. })
    }
}

fn join(handles: &[JobHandle]) -> String {
    if handles.is_empty() {
        return "none".to_string();
    }
    handles
        .iter()
        .map(JobHandle::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type SwarmResult<T> = Result<T, SwarmError>;
