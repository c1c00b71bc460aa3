//! Swarm lifecycle states.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// Where a swarm is in its lifecycle.
///
/// States advance strictly in declaration order; `Failed` can be entered
/// from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SwarmState {
    #[default]
    Idle,
    Submitting,
    AwaitingJobs,
    AwaitingEndpoints,
    /// Only reached when more than one endpoint resolved.
    AwaitingLoadBalancer,
    Serving,
    Released,
    /// Start-up failed. Any submitted jobs have already been released.
    Failed { reason: String },
}

impl SwarmState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwarmState::Released | SwarmState::Failed { .. })
    }
}

/// State shared between a controller and the session it hands out.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedState(Arc<Mutex<SwarmState>>);

impl SharedState {
    pub(crate) fn get(&self) -> SwarmState {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set(&self, next: SwarmState) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = ?*state, to = ?next, "swarm state");
        *state = next;
    }

    pub(crate) fn fail(&self, reason: impl ToString) {
        self.set(SwarmState::Failed {
            reason: reason.to_string(),
        });
    }
}
