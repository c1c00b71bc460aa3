//! Command-line overrides layered over the TOML config.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use swarm_core::{EngineKind, SchedulerKind, SwarmConfig};

/// Environment variable consulted when no token is configured.
const TOKEN_ENV: &str = "HUGGING_FACE_HUB_TOKEN";

/// Swarm settings. Every flag overrides the matching key of `--config`.
#[derive(Args, Debug, Default)]
pub struct SwarmArgs {
    /// TOML config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of inference server instances.
    #[arg(short, long)]
    pub instances: Option<u32>,

    /// Inference engine: tgi or vllm.
    #[arg(long)]
    pub inference_engine: Option<EngineKind>,

    /// Cluster manager: slurm or runai.
    #[arg(long)]
    pub job_scheduler: Option<SchedulerKind>,

    /// Job template file.
    #[arg(long)]
    pub template_path: Option<PathBuf>,

    /// Model to serve.
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub revision: Option<String>,

    /// GPUs per instance; fractional values allowed.
    #[arg(long)]
    pub gpus: Option<f64>,

    /// nginx config template.
    #[arg(long)]
    pub load_balancer_template_path: Option<PathBuf>,

    #[arg(long)]
    pub per_instance_max_parallel_requests: Option<u32>,

    /// Use an existing endpoint instead of provisioning.
    #[arg(long)]
    pub debug_endpoint: Option<String>,

    /// Access token passed to the job template.
    #[arg(long)]
    pub huggingface_token: Option<String>,

    #[arg(long)]
    pub model_max_input: Option<u32>,

    #[arg(long)]
    pub model_max_total: Option<u32>,

    /// Port each inference server listens on.
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub logs_folder: Option<PathBuf>,

    /// Delay between readiness checks, e.g. "3s".
    #[arg(long)]
    pub poll_interval: Option<String>,

    /// Give up on a readiness wait after this long, e.g. "10m".
    #[arg(long)]
    pub readiness_timeout: Option<String>,
}

macro_rules! apply {
    ($config:ident, $args:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $args.$field {
                $config.$field = value;
            }
        )+
    };
}

impl SwarmArgs {
    /// Resolve the effective config: file (or defaults), then flags, then
    /// the token environment variable.
    pub fn into_config(self) -> anyhow::Result<SwarmConfig> {
        let mut config = match &self.config {
            Some(path) => SwarmConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SwarmConfig::default(),
        };

        let args = self;
        apply!(
            config,
            args,
            instances,
            inference_engine,
            job_scheduler,
            template_path,
            model,
            revision,
            gpus,
            load_balancer_template_path,
            per_instance_max_parallel_requests,
            model_max_input,
            model_max_total,
            port,
            logs_folder,
            poll_interval,
            readiness_timeout,
        );
        if args.debug_endpoint.is_some() {
            config.debug_endpoint = args.debug_endpoint;
        }
        if args.huggingface_token.is_some() {
            config.huggingface_token = args.huggingface_token;
        }
        if config.huggingface_token.is_none() {
            config.huggingface_token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        swarm: SwarmArgs,
    }

    fn parse(args: &[&str]) -> SwarmArgs {
        TestCli::parse_from(std::iter::once("llm-swarm").chain(args.iter().copied())).swarm
    }

    #[test]
    fn no_flags_means_defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.instances, SwarmConfig::default().instances);
        assert_eq!(config.port, 6969);
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.toml");
        std::fs::write(&path, "instances = 4\nmodel = \"from-file\"\nport = 7000\n").unwrap();
        let path = path.display().to_string();

        let config = parse(&[
            "--config",
            &path,
            "--instances",
            "2",
            "--inference-engine",
            "vllm",
            "--job-scheduler",
            "runai",
            "--gpus",
            "0.5",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.instances, 2);
        assert_eq!(config.model, "from-file");
        assert_eq!(config.port, 7000);
        assert_eq!(config.inference_engine, EngineKind::Vllm);
        assert_eq!(config.job_scheduler, SchedulerKind::Runai);
        assert_eq!(config.gpus, 0.5);
    }

    #[test]
    fn invalid_override_is_rejected() {
        assert!(parse(&["--port", "80"]).into_config().is_err());
        assert!(parse(&["--instances", "0"]).into_config().is_err());
    }

    #[test]
    fn unknown_engine_is_a_parse_error() {
        let result = TestCli::try_parse_from(["llm-swarm", "--inference-engine", "llamacpp"]);
        assert!(result.is_err());
    }

    #[test]
    fn debug_endpoint_flag_is_kept() {
        let config = parse(&["--debug-endpoint", "http://10.0.0.1:6969"])
            .into_config()
            .unwrap();
        assert_eq!(config.debug_endpoint.as_deref(), Some("http://10.0.0.1:6969"));
    }
}
