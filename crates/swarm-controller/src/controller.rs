//! Swarm controller: drives one swarm from `Idle` to `Serving`.
//!
//! The sequence is strictly ordered: submit, wait for every job to run,
//! resolve and health-check endpoints, then either expose the single
//! endpoint or put a load balancer in front. Any failure after submission
//! cancels the submitted jobs before the error is returned.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use swarm_balancer::{BalancerError, BalancerProvisioner, ProxyHandle};
use swarm_core::{CommandRunner, Endpoint, JobHandle, SwarmConfig, Template, epoch_secs};
use swarm_health::{HealthProbe, PollError, PollPolicy, Poller};
use swarm_scheduler::{JobSpec, SchedulerBackend};

use crate::error::{SwarmError, SwarmResult};
use crate::resolver::{EndpointResolver, job_died};
use crate::session::SwarmSession;
use crate::state::{SharedState, SwarmState};

/// Hosted inference API with its own rate limit.
const HF_INFERENCE_API: &str = "https://api-inference.huggingface.co/";
const HF_INFERENCE_API_PARALLELISM: u32 = 40;

pub struct SwarmController {
    config: SwarmConfig,
    backend: Arc<dyn SchedulerBackend>,
    runner: Arc<dyn CommandRunner>,
    prober: Arc<dyn HealthProbe>,
    poller: Poller,
    state: SharedState,
}

impl SwarmController {
    /// Validate `config` and prepare the logs folder.
    ///
    /// Flipping `shutdown` to `true` interrupts any readiness wait; the
    /// controller then releases whatever it submitted.
    pub fn new(
        config: SwarmConfig,
        backend: Arc<dyn SchedulerBackend>,
        runner: Arc<dyn CommandRunner>,
        prober: Arc<dyn HealthProbe>,
        shutdown: watch::Receiver<bool>,
    ) -> SwarmResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.logs_folder).map_err(|source| SwarmError::LogsFolder {
            path: config.logs_folder.clone(),
            source,
        })?;
        let poller = Poller::new(PollPolicy::from_config(&config)?, shutdown);

        Ok(Self {
            config,
            backend,
            runner,
            prober,
            poller,
            state: SharedState::default(),
        })
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn state(&self) -> SwarmState {
        self.state.get()
    }

    /// Provision the swarm and wait until it can serve requests.
    pub async fn start(&self) -> SwarmResult<SwarmSession> {
        if self.state() != SwarmState::Idle {
            return Err(SwarmError::AlreadyStarted);
        }

        if let Some(endpoint) = self.config.debug_endpoint()? {
            let endpoint = self.visible(endpoint);
            info!(%endpoint, "using debug endpoint, nothing to provision");
            self.state.set(SwarmState::Serving);
            return Ok(self.session(endpoint, Vec::new(), None));
        }

        self.state.set(SwarmState::Submitting);
        let (spec, handles) = match self.submit().await {
            Ok(submitted) => submitted,
            Err(e) => {
                self.state.fail(&e);
                return Err(e);
            }
        };

        match self.bring_up(&spec, &handles).await {
            Ok((endpoint, proxy)) => {
                let endpoint = self.visible(endpoint);
                info!(
                    %endpoint,
                    jobs = handles.len(),
                    balanced = proxy.is_some(),
                    "swarm serving"
                );
                self.state.set(SwarmState::Serving);
                Ok(self.session(endpoint, handles, proxy))
            }
            Err(e) => {
                warn!(error = %e, jobs = handles.len(), "start-up failed, releasing submitted jobs");
                self.backend.cancel(&handles).await;
                self.state.fail(&e);
                Err(e)
            }
        }
    }

    async fn submit(&self) -> SwarmResult<(JobSpec, Vec<JobHandle>)> {
        if self.poller.is_cancelled() {
            return Err(SwarmError::Cancelled { stage: "submitting" });
        }
        let path = &self.config.template_path;
        let template = Template::from_file(path).map_err(|source| SwarmError::Template {
            path: path.clone(),
            source,
        })?;
        let spec = JobSpec::render(
            &self.config,
            template,
            self.backend.spec_extension(),
            epoch_secs(),
        );

        let handles = self
            .backend
            .submit(&spec, self.config.instances)
            .await
            .map_err(SwarmError::Submission)?;
        info!(
            scheduler = %self.backend.kind(),
            engine = %self.config.inference_engine,
            jobs = ?handles.iter().map(JobHandle::as_str).collect::<Vec<_>>(),
            spec = %spec.path.display(),
            "jobs submitted"
        );
        Ok((spec, handles))
    }

    /// Everything between submission and serving.
    async fn bring_up(
        &self,
        spec: &JobSpec,
        handles: &[JobHandle],
    ) -> SwarmResult<(Endpoint, Option<ProxyHandle>)> {
        self.state.set(SwarmState::AwaitingJobs);
        self.await_running(handles).await?;

        self.state.set(SwarmState::AwaitingEndpoints);
        let resolver = EndpointResolver::new(
            self.backend.clone(),
            self.prober.clone(),
            self.poller.clone(),
        );
        let mut endpoints = resolver.resolve(spec, handles).await?;

        if endpoints.len() == 1 {
            let endpoint = endpoints.remove(0);
            return Ok((endpoint, None));
        }
        if endpoints.is_empty() {
            return Err(SwarmError::EndpointResolution {
                resolved: 0,
                expected: handles.len(),
                outstanding: handles.to_vec(),
            });
        }

        self.state.set(SwarmState::AwaitingLoadBalancer);
        let provisioner = BalancerProvisioner::new(
            &self.config,
            self.runner.clone(),
            self.prober.clone(),
            self.poller.clone(),
        );
        let proxy = provisioner
            .provision(&endpoints)
            .await
            .map_err(|e| match e {
                BalancerError::Cancelled => SwarmError::Cancelled {
                    stage: "waiting for load balancer",
                },
                source => SwarmError::Proxy {
                    source,
                    outstanding: handles.to_vec(),
                },
            })?;
        Ok((proxy.endpoint().clone(), Some(proxy)))
    }

    /// Poll until every job is running.
    ///
    /// A job fails the wait on the attempt that observes it terminated, or
    /// no longer running after an earlier attempt saw it running.
    async fn await_running(&self, handles: &[JobHandle]) -> SwarmResult<()> {
        let dead: Mutex<Option<JobHandle>> = Mutex::new(None);
        let seen_running = Mutex::new(vec![false; handles.len()]);
        let (backend, dead, seen_running) = (self.backend.as_ref(), &dead, &seen_running);

        let result = self
            .poller
            .until(
                "jobs running",
                move || async move {
                    let states = backend.states(handles).await;
                    let mut seen = seen_running.lock().unwrap_or_else(PoisonError::into_inner);
                    let mut running = 0;
                    for (index, (handle, state)) in handles.iter().zip(states).enumerate() {
                        let stopped = state.is_terminal() || (seen[index] && !state.is_running());
                        if stopped {
                            *dead.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
                            return None;
                        }
                        if state.is_running() {
                            seen[index] = true;
                            running += 1;
                        }
                    }
                    debug!(running, total = handles.len(), "waiting for jobs");
                    (running == handles.len()).then_some(())
                },
                move || async move {
                    match dead.lock().unwrap_or_else(PoisonError::into_inner).take() {
                        Some(handle) => Err(handle),
                        None => Ok(()),
                    }
                },
            )
            .await;

        match result {
            Ok(ready) => {
                info!(jobs = handles.len(), attempts = ready.attempts, "all jobs running");
                Ok(())
            }
            Err(PollError::Dead(handle)) => Err(job_died(backend, handle, handles)),
            Err(PollError::TimedOut { attempts }) => Err(SwarmError::Unhealthy {
                stage: "jobs running",
                attempts,
                outstanding: handles.to_vec(),
            }),
            Err(PollError::Cancelled) => Err(SwarmError::Cancelled {
                stage: "waiting for jobs",
            }),
        }
    }

    /// Apply the engine's path suffix to the endpoint callers will see.
    fn visible(&self, endpoint: Endpoint) -> Endpoint {
        match self.config.inference_engine.endpoint_suffix() {
            Some(suffix) => endpoint.with_path(suffix),
            None => endpoint,
        }
    }

    fn session(
        &self,
        endpoint: Endpoint,
        handles: Vec<JobHandle>,
        proxy: Option<ProxyHandle>,
    ) -> SwarmSession {
        SwarmSession {
            endpoint,
            handles,
            proxy,
            suggested_max_parallel_requests: suggested_max_parallel_requests(&self.config),
            backend: self.backend.clone(),
            runner: self.runner.clone(),
            state: self.state.clone(),
            released: false,
        }
    }
}

/// Client concurrency for a swarm built from `config`.
pub fn suggested_max_parallel_requests(config: &SwarmConfig) -> u32 {
    match config.debug_endpoint.as_deref() {
        Some(raw) if raw.trim().starts_with(HF_INFERENCE_API) => HF_INFERENCE_API_PARALLELISM,
        _ => config.total_max_parallel_requests(),
    }
}
