//! Run:ai backend.
//!
//! Each instance is its own Kubernetes job named `runai-<ts>-<i>`,
//! created with `kubectl create -f`. Status and service addresses come
//! from the `runai list jobs -A` table.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use swarm_core::{CommandRunner, Endpoint, JobHandle, JobState, SchedulerKind};

use crate::backend::{JobSpec, SchedulerBackend, write_spec};
use crate::error::SchedulerResult;

/// One row of `runai list jobs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub name: String,
    pub status: String,
    /// Service address, `None` while the table shows `-`.
    pub endpoint: Option<String>,
}

pub struct RunaiBackend {
    runner: Arc<dyn CommandRunner>,
    /// Port the inference server listens on inside each job.
    port: u16,
}

impl RunaiBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, port: u16) -> Self {
        Self { runner, port }
    }

    async fn list_jobs(&self) -> Option<Vec<JobRow>> {
        match self.runner.run("runai", &["list", "jobs", "-A"]).await {
            Ok(out) => Some(parse_job_table(&out)),
            Err(e) => {
                warn!(error = %e, "runai list failed");
                None
            }
        }
    }

    async fn create_job(&self, spec: &JobSpec, index: u32) -> SchedulerResult<JobHandle> {
        let job_name = format!("runai-{}-{index}", spec.timestamp);
        let path = instance_spec_path(&spec.path, index);
        write_spec(&path, &spec.text.replace("{{job_name}}", &job_name)).await?;

        let path = path.display().to_string();
        self.runner.run("kubectl", &["create", "-f", &path]).await?;
        info!(%job_name, spec = %path, "runai job created");
        Ok(JobHandle::new(job_name))
    }
}

#[async_trait]
impl SchedulerBackend for RunaiBackend {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Runai
    }

    fn spec_extension(&self) -> &'static str {
        "yml"
    }

    async fn submit(&self, spec: &JobSpec, instances: u32) -> SchedulerResult<Vec<JobHandle>> {
        let mut handles = Vec::with_capacity(instances as usize);
        for index in 0..instances {
            match self.create_job(spec, index).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.cancel(&handles).await;
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    async fn job_state(&self, handle: &JobHandle) -> JobState {
        listed_state(self.list_jobs().await.as_deref(), handle)
    }

    async fn states(&self, handles: &[JobHandle]) -> Vec<JobState> {
        let rows = self.list_jobs().await;
        handles
            .iter()
            .map(|handle| listed_state(rows.as_deref(), handle))
            .collect()
    }

    async fn resolve_endpoints(
        &self,
        _spec: &JobSpec,
        handles: &[JobHandle],
    ) -> SchedulerResult<Vec<Endpoint>> {
        let Some(rows) = self.list_jobs().await else {
            return Ok(Vec::new());
        };
        let mut endpoints: Vec<Endpoint> = handles
            .iter()
            .filter_map(|handle| rows.iter().find(|row| row.name == handle.as_str()))
            .filter_map(|row| row.endpoint.as_deref())
            .map(|host| Endpoint::http(host, self.port))
            .collect();
        endpoints.truncate(handles.len());
        Ok(endpoints)
    }

    async fn cancel(&self, handles: &[JobHandle]) {
        for handle in handles {
            match self
                .runner
                .run("runai", &["delete", "job", handle.as_str()])
                .await
            {
                Ok(_) => info!(job = %handle, "runai job deleted"),
                Err(e) => warn!(job = %handle, error = %e, "failed to delete runai job"),
            }
        }
    }

    fn log_hint(&self, handle: &JobHandle) -> String {
        format!("runai logs {handle}")
    }
}

/// `<dir>/<stem>-<index>.<ext>` next to the rendered spec.
fn instance_spec_path(path: &Path, index: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string());
    let file = match path.extension() {
        Some(ext) => format!("{stem}-{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{index}"),
    };
    path.with_file_name(file)
}

/// Parse the whitespace table printed by `runai list jobs`.
///
/// Columns used: 0 = name, 1 = status, 3 = service address.
pub fn parse_job_table(output: &str) -> Vec<JobRow> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with("NAME"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 2 {
                return None;
            }
            let endpoint = cols
                .get(3)
                .filter(|e| **e != "-")
                .map(|e| e.to_string());
            Some(JobRow {
                name: cols[0].to_string(),
                status: cols[1].to_string(),
                endpoint,
            })
        })
        .collect()
}

/// State of `handle` in a job listing, `None` when the listing failed.
fn listed_state(rows: Option<&[JobRow]>, handle: &JobHandle) -> JobState {
    // `kubectl create` returns before Run:ai lists the job.
    rows.and_then(|rows| rows.iter().find(|row| row.name == handle.as_str()))
        .map_or(JobState::Submitted, runai_state)
}

fn runai_state(row: &JobRow) -> JobState {
    match row.status.as_str() {
        "Running" if row.endpoint.is_none() => JobState::Unreachable,
        "Running" => JobState::Running,
        "Pending" | "ContainerCreating" | "Initializing" | "Scheduled" | "Submitted" => {
            JobState::Submitted
        }
        _ => JobState::Terminated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::testing::ScriptedRunner;

    const TABLE: &str = "\
NAME               STATUS             AGE  NODE         IMAGE
runai-1700-0       Running            2m   10.1.0.4     ghcr.io/huggingface/tgi
runai-1700-1       ContainerCreating  2m   -            ghcr.io/huggingface/tgi
runai-1700-2       Failed             9m   10.1.0.9     ghcr.io/huggingface/tgi
someone-else       Running            1d   10.1.0.5     busybox
";

    fn backend(runner: ScriptedRunner) -> (Arc<ScriptedRunner>, RunaiBackend) {
        let runner = Arc::new(runner);
        (runner.clone(), RunaiBackend::new(runner, 6969))
    }

    #[test]
    fn table_parsing() {
        let rows = parse_job_table(TABLE);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            JobRow {
                name: "runai-1700-0".to_string(),
                status: "Running".to_string(),
                endpoint: Some("10.1.0.4".to_string()),
            }
        );
        assert_eq!(rows[1].endpoint, None);
    }

    #[test]
    fn instance_paths_are_distinct() {
        let base = Path::new("logs/1700_tgi.yml");
        assert_eq!(instance_spec_path(base, 0), Path::new("logs/1700_tgi-0.yml"));
        assert_eq!(instance_spec_path(base, 7), Path::new("logs/1700_tgi-7.yml"));
    }

    #[tokio::test]
    async fn submit_names_and_creates_each_job() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, backend) = backend(ScriptedRunner::new());
        let spec = JobSpec {
            timestamp: 1700,
            path: dir.path().join("1700_tgi.yml"),
            hosts_path: dir.path().join("unused.txt"),
            text: "metadata:\n  name: {{job_name}}\n".to_string(),
        };

        let handles = backend.submit(&spec, 2).await.unwrap();

        assert_eq!(
            handles,
            vec![JobHandle::new("runai-1700-0"), JobHandle::new("runai-1700-1")]
        );
        let second = std::fs::read_to_string(dir.path().join("1700_tgi-1.yml")).unwrap();
        assert_eq!(second, "metadata:\n  name: runai-1700-1\n");
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("kubectl create -f "));
        assert!(calls[1].ends_with("1700_tgi-1.yml"));
    }

    #[tokio::test]
    async fn submit_failure_deletes_jobs_already_created() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, backend) =
            backend(ScriptedRunner::new().ok("kubectl", "created").fail("kubectl", 1));
        let spec = JobSpec {
            timestamp: 1,
            path: dir.path().join("1_tgi.yml"),
            hosts_path: dir.path().join("h.txt"),
            text: String::new(),
        };
        assert!(backend.submit(&spec, 3).await.is_err());
        assert_eq!(runner.calls_to("runai"), vec!["runai delete job runai-1-0"]);
    }

    #[tokio::test]
    async fn job_state_from_table() {
        let (_, backend) = backend(
            ScriptedRunner::new()
                .ok("runai", TABLE)
                .ok("runai", TABLE)
                .ok("runai", TABLE)
                .ok("runai", TABLE),
        );
        assert_eq!(backend.job_state(&"runai-1700-0".into()).await, JobState::Running);
        assert_eq!(backend.job_state(&"runai-1700-1".into()).await, JobState::Submitted);
        assert_eq!(backend.job_state(&"runai-1700-2".into()).await, JobState::Terminated);
        assert_eq!(backend.job_state(&"runai-1700-9".into()).await, JobState::Submitted);
    }

    #[tokio::test]
    async fn states_share_one_listing() {
        let table = "\
NAME          STATUS   AGE  NODE       IMAGE
runai-5-0     Running  1m   10.1.0.4   tgi
runai-5-1     Running  1m   -          tgi
runai-5-2     Pending  1m   -          tgi
";
        let (runner, backend) = backend(ScriptedRunner::new().ok("runai", table));
        let handles: Vec<JobHandle> =
            ["runai-5-0", "runai-5-1", "runai-5-2", "runai-5-3"].map(JobHandle::new).into();

        let states = backend.states(&handles).await;

        assert_eq!(
            states,
            vec![
                JobState::Running,
                JobState::Unreachable,
                JobState::Submitted,
                JobState::Submitted
            ]
        );
        assert_eq!(runner.calls_to("runai").len(), 1);
    }

    #[tokio::test]
    async fn failed_listing_is_not_terminal() {
        let (_, backend) = backend(ScriptedRunner::new().fail("runai", 1));
        let states = backend.states(&[JobHandle::new("runai-5-0")]).await;
        assert_eq!(states, vec![JobState::Submitted]);
    }

    #[tokio::test]
    async fn is_running_uses_default_contract() {
        let (_, backend) = backend(ScriptedRunner::new().ok("runai", TABLE).ok("runai", TABLE));
        assert!(backend.is_running(&"runai-1700-0".into()).await);
        assert!(!backend.is_running(&"never-heard-of-it".into()).await);
    }

    #[tokio::test]
    async fn resolve_only_reports_published_addresses() {
        let (_, backend) = backend(ScriptedRunner::new().ok("runai", TABLE));
        let spec = JobSpec {
            timestamp: 1700,
            path: PathBuf::from("x.yml"),
            hosts_path: PathBuf::from("h.txt"),
            text: String::new(),
        };
        let handles = vec![JobHandle::new("runai-1700-0"), JobHandle::new("runai-1700-1")];

        let endpoints = backend.resolve_endpoints(&spec, &handles).await.unwrap();

        assert_eq!(endpoints, vec![Endpoint::http("10.1.0.4", 6969)]);
    }

    #[tokio::test]
    async fn cancel_deletes_every_job() {
        let (runner, backend) = backend(ScriptedRunner::new().fail("runai", 1));
        backend
            .cancel(&[JobHandle::new("runai-1-0"), JobHandle::new("runai-1-1")])
            .await;
        assert_eq!(
            runner.calls(),
            vec!["runai delete job runai-1-0", "runai delete job runai-1-1"]
        );
    }
}
