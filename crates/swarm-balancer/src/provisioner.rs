//! Proxy provisioning: config rendering, container start, readiness.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use swarm_core::{CommandRunner, Endpoint, SwarmConfig, Template};
use swarm_health::{HealthProbe, PollError, Poller};

use crate::error::{BalancerError, BalancerResult};
use crate::port::find_unused_port;

/// Where nginx expects its configuration inside the container.
const NGINX_CONF: &str = "/etc/nginx/nginx.conf";

/// A running proxy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHandle {
    container_id: String,
    endpoint: Endpoint,
    config_path: PathBuf,
}

impl ProxyHandle {
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Local address clients should use instead of the individual servers.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Kill the container. Failures are logged, never raised.
    pub async fn stop(&self, runner: &dyn CommandRunner) {
        match runner.run("docker", &["kill", &self.container_id]).await {
            Ok(_) => info!(container = %self.container_id, "load balancer stopped"),
            Err(e) => warn!(container = %self.container_id, error = %e, "failed to stop load balancer"),
        }
    }
}

/// Render the nginx template for `endpoints` behind `port`.
pub fn render_config(template: Template, endpoints: &[Endpoint], port: u16) -> Template {
    let servers = endpoints
        .iter()
        .map(|ep| format!("server {};", ep.authority()))
        .collect::<Vec<_>>()
        .join("\n");
    template
        .set("servers", servers)
        .set("port", port.to_string())
}

/// Starts nginx in front of a set of endpoints and waits for it.
pub struct BalancerProvisioner {
    runner: Arc<dyn CommandRunner>,
    prober: Arc<dyn HealthProbe>,
    poller: Poller,
    template_path: PathBuf,
    logs_folder: PathBuf,
    ports: RangeInclusive<u16>,
    image: String,
}

impl BalancerProvisioner {
    pub fn new(
        config: &SwarmConfig,
        runner: Arc<dyn CommandRunner>,
        prober: Arc<dyn HealthProbe>,
        poller: Poller,
    ) -> Self {
        Self {
            runner,
            prober,
            poller,
            template_path: config.load_balancer_template_path.clone(),
            logs_folder: config.logs_folder.clone(),
            ports: config.balancer_ports(),
            image: config.balancer_image.clone(),
        }
    }

    /// Bring up a proxy for `endpoints` and return once it is healthy.
    ///
    /// If the proxy never becomes healthy its container is killed before
    /// the error is returned.
    pub async fn provision(&self, endpoints: &[Endpoint]) -> BalancerResult<ProxyHandle> {
        let port = find_unused_port(self.ports.clone())?;

        let template =
            Template::from_file(&self.template_path).map_err(|source| BalancerError::Template {
                path: self.template_path.clone(),
                source,
            })?;
        let rendered = render_config(template, endpoints, port);
        let leftover = rendered.unresolved();
        if !leftover.is_empty() {
            warn!(tokens = ?leftover, "load balancer template has unresolved placeholders");
        }

        let config_path = self.logs_folder.join("load_balancer.conf");
        tokio::fs::write(&config_path, rendered.as_str())
            .await
            .map_err(|source| BalancerError::WriteConfig {
                path: config_path.clone(),
                source,
            })?;

        let absolute = std::path::absolute(&config_path).unwrap_or_else(|_| config_path.clone());
        let mount = format!("{}:{NGINX_CONF}", absolute.display());
        let publish = format!("{port}:{port}");
        let container_id = self
            .runner
            .run(
                "docker",
                &["run", "-d", "-p", &publish, "--network", "host", "-v", &mount, &self.image],
            )
            .await?;
        if container_id.is_empty() {
            return Err(BalancerError::ProxyStart {
                container: String::new(),
                reason: "docker run printed no container id".to_string(),
            });
        }

        let handle = ProxyHandle {
            container_id,
            endpoint: Endpoint::http("localhost", port),
            config_path,
        };
        info!(
            container = %handle.container_id,
            endpoint = %handle.endpoint,
            upstreams = endpoints.len(),
            "load balancer starting"
        );

        match self.wait_healthy(&handle).await {
            Ok(attempts) => {
                info!(endpoint = %handle.endpoint, attempts, "load balancer ready");
                Ok(handle)
            }
            Err(e) => {
                handle.stop(self.runner.as_ref()).await;
                Err(e)
            }
        }
    }

    async fn wait_healthy(&self, handle: &ProxyHandle) -> BalancerResult<u32> {
        let seen = AtomicUsize::new(0);
        let (this, seen, container, endpoint) =
            (self, &seen, handle.container_id.as_str(), &handle.endpoint);

        let result = self
            .poller
            .until(
                "load balancer",
                move || async move {
                    this.forward_logs(container, seen).await;
                    this.prober.probe(endpoint).await.is_healthy().then_some(())
                },
                move || async move { this.container_alive(container).await },
            )
            .await;

        result.map(|ready| ready.attempts).map_err(|e| match e {
            PollError::Cancelled => BalancerError::Cancelled,
            PollError::TimedOut { attempts } => BalancerError::ProxyStart {
                container: container.to_string(),
                reason: format!("not healthy after {attempts} attempts"),
            },
            PollError::Dead(reason) => BalancerError::ProxyStart {
                container: container.to_string(),
                reason,
            },
        })
    }

    /// Re-emit container output lines not seen on a previous attempt.
    async fn forward_logs(&self, container: &str, seen: &AtomicUsize) {
        let logs = match self.runner.run("docker", &["logs", container]).await {
            Ok(logs) => logs,
            Err(e) => {
                debug!(%container, error = %e, "could not read proxy logs");
                return;
            }
        };
        let lines: Vec<&str> = logs.lines().collect();
        let already = seen.load(Ordering::Relaxed).min(lines.len());
        for line in &lines[already..] {
            info!(target: "swarm_balancer::proxy", "{line}");
        }
        seen.store(lines.len(), Ordering::Relaxed);
    }

    async fn container_alive(&self, container: &str) -> Result<(), String> {
        match self
            .runner
            .run("docker", &["inspect", "-f", "{{.State.Running}}", container])
            .await
        {
            Ok(state) if state.trim() == "false" => Err("container exited".to_string()),
            Ok(_) => Ok(()),
            Err(e) => Err(format!("container vanished: {e}")),
        }
    }
}
