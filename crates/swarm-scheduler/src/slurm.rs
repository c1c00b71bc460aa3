//! Slurm backend.
//!
//! Jobs are submitted with `sbatch --parsable`, observed with `squeue`,
//! and cancelled with `scancel`. Slurm has no notion of service
//! endpoints, so the job script itself appends `http://<host>:<port>` to
//! the rendered job's hosts file once the server is up; resolution reads that
//! file back.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use swarm_core::{CommandRunner, Endpoint, JobHandle, JobState, SchedulerKind};

use crate::backend::{JobSpec, SchedulerBackend, write_spec};
use crate::error::{SchedulerError, SchedulerResult};

pub struct SlurmBackend {
    runner: Arc<dyn CommandRunner>,
    logs_folder: PathBuf,
}

impl SlurmBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, logs_folder: PathBuf) -> Self {
        Self {
            runner,
            logs_folder,
        }
    }

    /// `(job id, state)` for every job the current user has queued.
    async fn queue(&self) -> Option<Vec<(String, String)>> {
        match self
            .runner
            .run("squeue", &["--me", "--noheader", "--format=%i %T"])
            .await
        {
            Ok(out) => Some(parse_squeue(&out)),
            Err(e) => {
                warn!(error = %e, "squeue failed");
                None
            }
        }
    }

    async fn sbatch(&self, path: &str, index: u32) -> SchedulerResult<JobHandle> {
        let out = self.runner.run("sbatch", &["--parsable", path]).await?;
        // `--parsable` prints "<id>" or "<id>;<cluster>".
        let id = out.split(';').next().unwrap_or("").trim();
        if id.is_empty() {
            return Err(SchedulerError::EmptyJobId { index });
        }
        Ok(JobHandle::new(id))
    }
}

#[async_trait]
impl SchedulerBackend for SlurmBackend {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Slurm
    }

    fn spec_extension(&self) -> &'static str {
        "slurm"
    }

    async fn submit(&self, spec: &JobSpec, instances: u32) -> SchedulerResult<Vec<JobHandle>> {
        if instances == 0 {
            return Ok(Vec::new());
        }
        write_spec(&spec.path, &spec.text).await?;

        let path = spec.path.display().to_string();
        let mut handles = Vec::with_capacity(instances as usize);
        for index in 0..instances {
            match self.sbatch(&path, index).await {
                Ok(handle) => {
                    info!(job_id = %handle, spec = %path, "slurm job submitted");
                    handles.push(handle);
                }
                Err(e) => {
                    self.cancel(&handles).await;
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    async fn job_state(&self, handle: &JobHandle) -> JobState {
        queued_state(self.queue().await.as_deref(), handle)
    }

    async fn states(&self, handles: &[JobHandle]) -> Vec<JobState> {
        let queue = self.queue().await;
        handles
            .iter()
            .map(|handle| queued_state(queue.as_deref(), handle))
            .collect()
    }

    async fn resolve_endpoints(
        &self,
        spec: &JobSpec,
        handles: &[JobHandle],
    ) -> SchedulerResult<Vec<Endpoint>> {
        let content = match tokio::fs::read_to_string(&spec.hosts_path).await {
            Ok(content) => content,
            Err(e) => {
                // Not written yet, or written and read concurrently.
                debug!(path = %spec.hosts_path.display(), error = %e, "hosts file not readable yet");
                return Ok(Vec::new());
            }
        };

        let mut endpoints = Vec::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match Endpoint::parse(line) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => warn!(%line, error = %e, "skipping malformed hosts entry"),
            }
        }
        endpoints.truncate(handles.len());
        Ok(endpoints)
    }

    async fn cancel(&self, handles: &[JobHandle]) {
        for handle in handles {
            match self.runner.run("scancel", &[handle.as_str()]).await {
                Ok(_) => info!(job_id = %handle, "slurm job cancelled"),
                Err(e) => warn!(job_id = %handle, error = %e, "failed to cancel slurm job"),
            }
        }
    }

    fn log_hint(&self, handle: &JobHandle) -> String {
        self.logs_folder
            .join(format!("llm-swarm_{handle}.out"))
            .display()
            .to_string()
    }
}

/// Parse `squeue --noheader --format="%i %T"` output.
fn parse_squeue(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let id = cols.next()?;
            let state = cols.next().unwrap_or("");
            Some((id.to_string(), state.to_string()))
        })
        .collect()
}

/// State of `handle` in a `squeue` listing, `None` when the listing failed.
fn queued_state(queue: Option<&[(String, String)]>, handle: &JobHandle) -> JobState {
    let Some(queue) = queue else {
        // Unknown is not dead; the next poll asks again.
        return JobState::Submitted;
    };
    match queue.iter().find(|(id, _)| id == handle.as_str()) {
        Some((_, state)) => slurm_state(state),
        // Finished jobs drop out of squeue.
        None => JobState::Terminated,
    }
}

/// Map a Slurm job state name to a [`JobState`].
fn slurm_state(state: &str) -> JobState {
    match state.to_ascii_uppercase().as_str() {
        "RUNNING" | "R" => JobState::Running,
        "PENDING" | "PD" | "CONFIGURING" | "CF" | "REQUEUED" | "RESIZING" | "SUSPENDED" => {
            JobState::Submitted
        }
        _ => JobState::Terminated,
    }
}
