//! Load balancer error types.

use std::path::PathBuf;

use swarm_core::CommandError;
use thiserror::Error;

/// Errors that can occur while provisioning the proxy.
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("no free port in range {start}-{end}")]
    NoPortAvailable { start: u16, end: u16 },

    #[error("failed to read load balancer template {path}: {source}")]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write load balancer config {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to launch proxy: {0}")]
    Launch(#[from] CommandError),

    #[error("proxy {container} never became healthy: {reason}")]
    ProxyStart { container: String, reason: String },

    #[error("cancelled while waiting for proxy")]
    Cancelled,
}

pub type BalancerResult<T> = Result<T, BalancerError>;
