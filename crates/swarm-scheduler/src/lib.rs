//! swarm-scheduler — the cluster side of an LLM swarm.
//!
//! Every cluster-specific detail (command syntax, output parsing) lives
//! behind the [`SchedulerBackend`] contract:
//!
//! - `submit` — launch N job instances from one rendered spec
//! - `states` — every handle's state from one cluster listing
//! - `is_running` — single-shot liveness query
//! - `resolve_endpoints` — best-effort handle → endpoint mapping
//! - `cancel` — best-effort, idempotent teardown
//!
//! # Backends
//!
//! ```text
//! SchedulerBackend
//!   ├── SlurmBackend  (sbatch / squeue / scancel, hosts file)
//!   └── RunaiBackend  (kubectl create / runai list / runai delete)
//! ```
//!
//! The backend is picked once from `SwarmConfig::job_scheduler` by
//! [`create_backend`].

use std::sync::Arc;

use swarm_core::{CommandRunner, SchedulerKind, SwarmConfig};

pub mod backend;
pub mod error;
pub mod runai;
pub mod slurm;

pub use backend::{JobSpec, SchedulerBackend};
pub use error::{SchedulerError, SchedulerResult};
pub use runai::RunaiBackend;
pub use slurm::SlurmBackend;

/// Build the backend for the configured cluster manager.
pub fn create_backend(
    config: &SwarmConfig,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn SchedulerBackend> {
    match config.job_scheduler {
        SchedulerKind::Slurm => Arc::new(SlurmBackend::new(runner, config.logs_folder.clone())),
        SchedulerKind::Runai => Arc::new(RunaiBackend::new(runner, config.port)),
    }
}
