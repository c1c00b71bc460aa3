//! The scheduler backend contract and the rendered job spec it consumes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use swarm_core::{Endpoint, JobHandle, JobState, SchedulerKind, SwarmConfig, Template};

use crate::error::{SchedulerError, SchedulerResult};

/// A job template rendered for one swarm, plus where it lives on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    /// Unix timestamp shared by every artifact of this submission.
    pub timestamp: u64,
    /// Where the rendered spec is written before submission.
    pub path: PathBuf,
    /// File the job script appends its endpoint to (Slurm only).
    pub hosts_path: PathBuf,
    /// Rendered text. `{{job_name}}` is still open for per-instance naming.
    pub text: String,
}

impl JobSpec {
    /// Render `template` with every swarm-level token.
    ///
    /// Leftover placeholders other than `{{job_name}}` are logged, not
    /// rejected.
    pub fn render(
        config: &SwarmConfig,
        template: Template,
        extension: &str,
        timestamp: u64,
    ) -> Self {
        let engine = config.inference_engine.as_str();
        let path = config
            .logs_folder
            .join(format!("{timestamp}_{engine}.{extension}"));
        let hosts_path = config
            .logs_folder
            .join(format!("{timestamp}_host_{engine}.txt"));

        let max_total = config.model_max_total.to_string();
        let max_input = config.model_max_input.to_string();
        let rendered = template.render([
            ("HUGGING_FACE_HUB_TOKEN", config.huggingface_token.clone().unwrap_or_default()),
            ("hosts_path", hosts_path.display().to_string()),
            ("model", config.model.clone()),
            ("revision", config.revision.clone()),
            ("port", config.port.to_string()),
            ("gpus", config.gpus.to_string()),
            ("model_max_total", max_total.clone()),
            ("model_max_output", max_total),
            ("model_max_input", max_input.clone()),
            ("model_input_length", max_input),
            (
                "max_concurrent_requests",
                config.per_instance_max_parallel_requests.to_string(),
            ),
        ]);

        let leftover: BTreeSet<String> = rendered
            .unresolved()
            .into_iter()
            .filter(|name| name != "job_name")
            .collect();
        if !leftover.is_empty() {
            warn!(tokens = ?leftover, "job template has unresolved placeholders");
        }

        Self {
            timestamp,
            path,
            hosts_path,
            text: rendered.into_string(),
        }
    }
}

/// Operations every cluster manager must support.
///
/// Implementations never retry internally; callers poll.
#[async_trait]
pub trait SchedulerBackend: Send + Sync {
    fn kind(&self) -> SchedulerKind;

    /// File extension of the rendered spec (`slurm`, `yml`).
    fn spec_extension(&self) -> &'static str;

    /// Launch `instances` independent jobs from one spec.
    ///
    /// Returns one handle per instance, in submission order. Any cluster
    /// command exiting non-zero fails the whole submission.
    async fn submit(&self, spec: &JobSpec, instances: u32) -> SchedulerResult<Vec<JobHandle>>;

    /// Current state of one job, from a single cluster query.
    async fn job_state(&self, handle: &JobHandle) -> JobState;

    /// States of every handle, in order.
    ///
    /// Backends that can list all their jobs at once override this so one
    /// poll costs one cluster query regardless of instance count.
    async fn states(&self, handles: &[JobHandle]) -> Vec<JobState> {
        let mut states = Vec::with_capacity(handles.len());
        for handle in handles {
            states.push(self.job_state(handle).await);
        }
        states
    }

    /// Single-shot liveness query. Unknown handles are simply not running.
    async fn is_running(&self, handle: &JobHandle) -> bool {
        self.job_state(handle).await.is_running()
    }

    /// Endpoints published so far for `handles`.
    ///
    /// May return fewer endpoints than handles while the cluster catches
    /// up, never more.
    async fn resolve_endpoints(
        &self,
        spec: &JobSpec,
        handles: &[JobHandle],
    ) -> SchedulerResult<Vec<Endpoint>>;

    /// Cancel every handle. Individual failures are logged, never raised.
    async fn cancel(&self, handles: &[JobHandle]);

    /// Where an operator should look when `handle` misbehaves.
    fn log_hint(&self, handle: &JobHandle) -> String;
}

/// Write a spec file, mapping I/O failures to [`SchedulerError::WriteSpec`].
pub(crate) async fn write_spec(path: &Path, text: &str) -> SchedulerResult<()> {
    tokio::fs::write(path, text)
        .await
        .map_err(|source| SchedulerError::WriteSpec {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> SwarmConfig {
        SwarmConfig {
            logs_folder: dir.to_path_buf(),
            huggingface_token: Some("hf_secret".to_string()),
            ..SwarmConfig::default()
        }
    }

    #[test]
    fn render_fills_swarm_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let template = Template::new(
            "--model-id {{model}} --revision {{revision}} --port {{port}} \
             --max-total-tokens {{model_max_total}} --max-input-length {{model_input_length}} \
             --max-concurrent-requests {{max_concurrent_requests}} \
             echo $HOST >> {{hosts_path}} token={{HUGGING_FACE_HUB_TOKEN}} gpus={{gpus}}",
        );

        let spec = JobSpec::render(&config, template, "slurm", 1700000000);

        assert_eq!(spec.path, dir.path().join("1700000000_tgi.slurm"));
        assert_eq!(spec.hosts_path, dir.path().join("1700000000_host_tgi.txt"));
        assert!(spec.text.contains("--model-id mistralai/Mistral-7B-Instruct-v0.1"));
        assert!(spec.text.contains("--revision main"));
        assert!(spec.text.contains("--port 6969"));
        assert!(spec.text.contains("--max-total-tokens 300"));
        assert!(spec.text.contains("--max-input-length 200"));
        assert!(spec.text.contains("--max-concurrent-requests 128"));
        assert!(spec.text.contains("token=hf_secret"));
        assert!(spec.text.contains("gpus=0.4"));
        assert!(spec.text.contains(&format!(">> {}", spec.hosts_path.display())));
    }

    #[test]
    fn render_keeps_job_name_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let spec = JobSpec::render(
            &config,
            Template::new("name: {{job_name}}\nunknown: {{mystery}}"),
            "yml",
            1,
        );
        assert_eq!(spec.text, "name: {{job_name}}\nunknown: {{mystery}}");
    }

    #[test]
    fn shipped_templates_render_completely() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shipped = [
            include_str!("../../../templates/tgi_h100.template.slurm"),
            include_str!("../../../templates/vllm_h100.template.slurm"),
            include_str!("../../../templates/tgi.template.yml"),
        ];
        for text in shipped {
            let spec = JobSpec::render(&config, Template::new(text), "slurm", 1);
            let leftover = Template::new(spec.text).unresolved();
            assert!(
                leftover.iter().all(|t| t == "job_name"),
                "unexpected placeholders: {leftover:?}"
            );
        }
    }

    #[test]
    fn missing_token_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwarmConfig {
            huggingface_token: None,
            ..config_in(dir.path())
        };
        let spec = JobSpec::render(&config, Template::new("[{{HUGGING_FACE_HUB_TOKEN}}]"), "yml", 1);
        assert_eq!(spec.text, "[]");
    }
}
