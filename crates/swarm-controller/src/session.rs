//! The live swarm handed to callers once start-up succeeds.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use swarm_balancer::ProxyHandle;
use swarm_core::{CommandRunner, Endpoint, JobHandle};
use swarm_scheduler::SchedulerBackend;

use crate::state::{SharedState, SwarmState};

/// A serving swarm: one visible endpoint plus everything it owns.
///
/// Call [`SwarmSession::release`] when done. Dropping an unreleased
/// session only logs a warning; async teardown cannot run in `Drop`.
pub struct SwarmSession {
    pub(crate) endpoint: Endpoint,
    pub(crate) handles: Vec<JobHandle>,
    pub(crate) proxy: Option<ProxyHandle>,
    pub(crate) suggested_max_parallel_requests: u32,
    pub(crate) backend: Arc<dyn SchedulerBackend>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) state: SharedState,
    pub(crate) released: bool,
}

impl SwarmSession {
    /// The single address clients should send requests to.
    ///
    /// Either the only job's endpoint or the load balancer's, with the
    /// engine's path suffix applied. Fixed for the life of the session.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Jobs owned by this swarm. Empty for a debug endpoint.
    pub fn handles(&self) -> &[JobHandle] {
        &self.handles
    }

    pub fn proxy(&self) -> Option<&ProxyHandle> {
        self.proxy.as_ref()
    }

    /// Concurrency a client should cap itself at.
    pub fn suggested_max_parallel_requests(&self) -> u32 {
        self.suggested_max_parallel_requests
    }

    pub fn state(&self) -> SwarmState {
        self.state.get()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop the proxy and cancel every job. Safe to call more than once.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(proxy) = &self.proxy {
            proxy.stop(self.runner.as_ref()).await;
        }
        if !self.handles.is_empty() {
            info!(jobs = self.handles.len(), "cancelling swarm jobs");
            self.backend.cancel(&self.handles).await;
        }
        self.state.set(SwarmState::Released);
        info!(endpoint = %self.endpoint, "swarm released");
    }
}

impl fmt::Debug for SwarmSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwarmSession")
            .field("endpoint", &self.endpoint)
            .field("handles", &self.handles)
            .field("proxy", &self.proxy)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for SwarmSession {
    fn drop(&mut self) {
        if !self.released && (!self.handles.is_empty() || self.proxy.is_some()) {
            let jobs: Vec<&str> = self.handles.iter().map(JobHandle::as_str).collect();
            warn!(?jobs, "swarm session dropped without release; jobs may still be running");
        }
    }
}
