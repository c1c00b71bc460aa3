//! Swarm configuration: TOML file format and construction-time validation.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::{Endpoint, EndpointError};
use crate::types::{EngineKind, SchedulerKind};

/// Invalid configuration. Raised before any cluster interaction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("instances must be at least 1")]
    NoInstances,

    #[error("port must be between 1024 and 65535, got {0}")]
    PortOutOfRange(u16),

    #[error("number of GPUs must be greater than zero, got {0}")]
    NonPositiveGpus(f64),

    #[error("model must not be empty")]
    EmptyModel,

    #[error("model_max_input ({input}) exceeds model_max_total ({total})")]
    TokenBudget { input: u32, total: u32 },

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("balancer port range {start}-{end} is empty")]
    EmptyPortRange { start: u16, end: u16 },

    #[error("invalid debug endpoint: {0}")]
    DebugEndpoint(#[from] EndpointError),
}

/// Immutable description of a swarm.
///
/// Field names match the keys of the TOML file. Every field has a default,
/// so an empty file is a valid single-instance TGI swarm on Slurm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwarmConfig {
    pub instances: u32,
    pub inference_engine: EngineKind,
    pub job_scheduler: SchedulerKind,
    pub template_path: PathBuf,
    pub model: String,
    pub revision: String,
    /// GPUs per instance. Fractional values are allowed on Run:ai.
    pub gpus: f64,
    pub load_balancer_template_path: PathBuf,
    pub per_instance_max_parallel_requests: u32,
    /// Pre-existing endpoint. When set, nothing is provisioned.
    pub debug_endpoint: Option<String>,
    /// Read from the file, a flag, or the environment. Never serialized.
    #[serde(skip_serializing)]
    pub huggingface_token: Option<String>,
    pub model_max_input: u32,
    pub model_max_total: u32,
    /// Port each inference server listens on.
    pub port: u16,
    pub logs_folder: PathBuf,
    /// Delay between readiness poll attempts ("3s", "500ms", ...).
    pub poll_interval: String,
    /// Wall-clock budget for each readiness wait.
    pub readiness_timeout: String,
    /// Timeout for a single health probe request.
    pub probe_timeout: String,
    pub balancer_port_range: (u16, u16),
    pub balancer_image: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            instances: 1,
            inference_engine: EngineKind::Tgi,
            job_scheduler: SchedulerKind::Slurm,
            template_path: PathBuf::from("templates/tgi_h100.template.slurm"),
            model: "mistralai/Mistral-7B-Instruct-v0.1".to_string(),
            revision: "main".to_string(),
            gpus: 0.4,
            load_balancer_template_path: PathBuf::from("templates/nginx.template.conf"),
            per_instance_max_parallel_requests: 128,
            debug_endpoint: None,
            huggingface_token: None,
            model_max_input: 200,
            model_max_total: 300,
            port: 6969,
            logs_folder: PathBuf::from("logs"),
            poll_interval: "3s".to_string(),
            readiness_timeout: "10m".to_string(),
            probe_timeout: "5s".to_string(),
            balancer_port_range: (50000, 65535),
            balancer_image: "nginx".to_string(),
        }
    }
}

impl SwarmConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SwarmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant. Called once before a controller is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instances == 0 {
            return Err(ConfigError::NoInstances);
        }
        if self.port < 1024 {
            return Err(ConfigError::PortOutOfRange(self.port));
        }
        if !self.gpus.is_finite() || self.gpus <= 0.0 {
            return Err(ConfigError::NonPositiveGpus(self.gpus));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if self.model_max_input > self.model_max_total {
            return Err(ConfigError::TokenBudget {
                input: self.model_max_input,
                total: self.model_max_total,
            });
        }
        let (start, end) = self.balancer_port_range;
        if start > end || start == 0 {
            return Err(ConfigError::EmptyPortRange { start, end });
        }
        self.poll_interval()?;
        self.readiness_timeout()?;
        self.probe_timeout()?;
        self.debug_endpoint()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        positive_duration("poll_interval", &self.poll_interval)
    }

    pub fn readiness_timeout(&self) -> Result<Duration, ConfigError> {
        positive_duration("readiness_timeout", &self.readiness_timeout)
    }

    pub fn probe_timeout(&self) -> Result<Duration, ConfigError> {
        positive_duration("probe_timeout", &self.probe_timeout)
    }

    /// Attempt budget for one readiness wait: timeout / interval, at least 1.
    pub fn max_poll_attempts(&self) -> Result<u32, ConfigError> {
        let interval = self.poll_interval()?;
        let timeout = self.readiness_timeout()?;
        let attempts = timeout.as_millis() / interval.as_millis().max(1);
        Ok(attempts.clamp(1, u32::MAX as u128) as u32)
    }

    pub fn debug_endpoint(&self) -> Result<Option<Endpoint>, ConfigError> {
        match self.debug_endpoint.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Ok(Some(Endpoint::parse(raw)?)),
        }
    }

    pub fn balancer_ports(&self) -> RangeInclusive<u16> {
        self.balancer_port_range.0..=self.balancer_port_range.1
    }

    /// Aggregate concurrency a client should use against the whole swarm.
    pub fn total_max_parallel_requests(&self) -> u32 {
        self.per_instance_max_parallel_requests
            .saturating_mul(self.instances)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn positive_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value)
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::Duration {
            field,
            value: value.to_string(),
        })
}

/// Parse `<digits><unit>` with unit `ms`, `s`, `m`, or `h`, e.g. "500ms"
/// or "10m". A bare number is read as seconds.
///
/// Values that overflow are rejected rather than wrapped.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()));
    let value: u64 = digits.parse().ok()?;
    match unit.trim_start() {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
