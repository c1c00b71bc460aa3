//! Endpoint resolution: job handles to healthy endpoints.
//!
//! Two phases. First the backend is asked for endpoints until it reports
//! one per handle; a short count is a publishing race, retried, unless a
//! job has meanwhile stopped running. Then the endpoints are health-probed
//! concurrently until all answer. Every liveness check is one batched
//! state query for all handles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use swarm_core::{Endpoint, JobHandle};
use swarm_health::{HealthProbe, PollError, Poller};
use swarm_scheduler::{JobSpec, SchedulerBackend};

use crate::error::{SwarmError, SwarmResult};

pub struct EndpointResolver {
    backend: Arc<dyn SchedulerBackend>,
    prober: Arc<dyn HealthProbe>,
    poller: Poller,
}

impl EndpointResolver {
    pub fn new(
        backend: Arc<dyn SchedulerBackend>,
        prober: Arc<dyn HealthProbe>,
        poller: Poller,
    ) -> Self {
        Self {
            backend,
            prober,
            poller,
        }
    }

    /// Resolve one healthy endpoint per handle.
    pub async fn resolve(&self, spec: &JobSpec, handles: &[JobHandle]) -> SwarmResult<Vec<Endpoint>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }
        let endpoints = self.await_endpoints(spec, handles).await?;
        self.await_healthy(&endpoints, handles).await?;
        Ok(endpoints)
    }

    /// Phase 1: poll until the backend publishes one endpoint per handle.
    pub async fn await_endpoints(
        &self,
        spec: &JobSpec,
        handles: &[JobHandle],
    ) -> SwarmResult<Vec<Endpoint>> {
        let expected = handles.len();
        let last_count = AtomicUsize::new(0);
        let (this, last) = (self, &last_count);

        let result = self
            .poller
            .until(
                "endpoints",
                move || async move {
                    match this.backend.resolve_endpoints(spec, handles).await {
                        Ok(endpoints) => {
                            last.store(endpoints.len(), Ordering::Relaxed);
                            if endpoints.len() == expected {
                                return Some(endpoints);
                            }
                            debug!(resolved = endpoints.len(), expected, "endpoints not all published yet");
                            None
                        }
                        Err(e) => {
                            warn!(error = %e, "endpoint lookup failed");
                            None
                        }
                    }
                },
                move || this.first_dead(handles),
            )
            .await;

        match result {
            Ok(ready) => {
                info!(count = expected, attempts = ready.attempts, "endpoints resolved");
                Ok(ready.value)
            }
            Err(PollError::Dead(handle)) => Err(job_died(self.backend.as_ref(), handle, handles)),
            Err(PollError::TimedOut { .. }) => Err(SwarmError::EndpointResolution {
                resolved: last_count.load(Ordering::Relaxed),
                expected,
                outstanding: handles.to_vec(),
            }),
            Err(PollError::Cancelled) => Err(SwarmError::Cancelled {
                stage: "resolving endpoints",
            }),
        }
    }

    /// Phase 2: every endpoint must pass a health probe.
    ///
    /// One poll covers the whole set. Each attempt probes the endpoints that
    /// have not answered yet concurrently, and one liveness query covers
    /// every handle.
    pub async fn await_healthy(&self, endpoints: &[Endpoint], handles: &[JobHandle]) -> SwarmResult<()> {
        let healthy = Mutex::new(vec![false; endpoints.len()]);
        let (this, healthy) = (self, &healthy);

        let result = self
            .poller
            .until(
                "endpoint health",
                move || async move {
                    let pending: Vec<usize> = {
                        let healthy = healthy.lock().unwrap_or_else(PoisonError::into_inner);
                        (0..endpoints.len()).filter(|i| !healthy[*i]).collect()
                    };
                    let results = join_all(
                        pending
                            .iter()
                            .map(|i| this.prober.probe(&endpoints[*i])),
                    )
                    .await;

                    let mut healthy = healthy.lock().unwrap_or_else(PoisonError::into_inner);
                    for (index, result) in pending.into_iter().zip(results) {
                        if result.is_healthy() {
                            info!(endpoint = %endpoints[index], "endpoint healthy");
                            healthy[index] = true;
                        }
                    }
                    let waiting = healthy.iter().filter(|ok| !**ok).count();
                    if waiting > 0 {
                        debug!(waiting, total = endpoints.len(), "endpoints not healthy yet");
                    }
                    (waiting == 0).then_some(())
                },
                move || this.first_dead(handles),
            )
            .await;

        match result {
            Ok(ready) => {
                info!(count = endpoints.len(), attempts = ready.attempts, "all endpoints healthy");
                Ok(())
            }
            Err(PollError::Dead(handle)) => Err(job_died(self.backend.as_ref(), handle, handles)),
            Err(PollError::TimedOut { attempts }) => Err(SwarmError::Unhealthy {
                stage: "endpoint health",
                attempts,
                outstanding: handles.to_vec(),
            }),
            Err(PollError::Cancelled) => Err(SwarmError::Cancelled {
                stage: "probing endpoints",
            }),
        }
    }

    /// The first handle the backend no longer reports as running.
    async fn first_dead(&self, handles: &[JobHandle]) -> Result<(), JobHandle> {
        let states = self.backend.states(handles).await;
        match handles.iter().zip(states).find(|(_, state)| !state.is_running()) {
            Some((handle, _)) => Err(handle.clone()),
            None => Ok(()),
        }
    }
}

/// Build a [`SwarmError::JobDied`] pointing at the dead job's logs.
pub(crate) fn job_died(
    backend: &dyn SchedulerBackend,
    handle: JobHandle,
    handles: &[JobHandle],
) -> SwarmError {
    let hint = backend.log_hint(&handle);
    warn!(job = %handle, logs = %hint, "job is no longer running");
    SwarmError::JobDied {
        handle,
        hint,
        outstanding: handles.to_vec(),
    }
}
