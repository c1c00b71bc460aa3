//! Scheduler error types.

use std::path::PathBuf;

use swarm_core::CommandError;
use thiserror::Error;

/// Errors that can occur while talking to a cluster manager.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("cluster command failed: {0}")]
    Command(#[from] CommandError),

    #[error("failed to write job spec {path}: {source}")]
    WriteSpec {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("submission returned no job id (instance {index})")]
    EmptyJobId { index: u32 },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
