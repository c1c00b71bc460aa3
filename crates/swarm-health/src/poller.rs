//! Bounded, cancellable retry-until-ready loop.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use swarm_core::{ConfigError, SwarmConfig};

use crate::error::PollError;

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between attempts.
    pub interval: Duration,
    /// Attempts before giving up. Always at least 1.
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &SwarmConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.poll_interval()?, config.max_poll_attempts()?))
    }
}

impl Default for PollPolicy {
    /// Three seconds between attempts, ten minutes in total.
    fn default() -> Self {
        Self::new(Duration::from_secs(3), 200)
    }
}

/// A successful wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready<T> {
    pub value: T,
    /// Number of times the check ran, including the one that passed.
    pub attempts: u32,
}

/// Retry primitive shared by every readiness wait in a swarm.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Poller {
    /// A poller that stops early once `shutdown` flips to `true`.
    pub fn new(policy: PollPolicy, shutdown: watch::Receiver<bool>) -> Self {
        Self { policy, shutdown }
    }

    /// A poller nobody can cancel.
    pub fn uncancellable(policy: PollPolicy) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(policy, rx)
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run `check` until it yields a value.
    ///
    /// After each miss `liveness` runs; an `Err` from it ends the wait
    /// immediately as [`PollError::Dead`] so a vanished job fails fast
    /// instead of burning the whole budget. The shutdown signal interrupts
    /// both the check and the sleep.
    pub async fn until<T, E, C, CF, L, LF>(
        &self,
        what: &str,
        mut check: C,
        mut liveness: L,
    ) -> Result<Ready<T>, PollError<E>>
    where
        C: FnMut() -> CF,
        CF: Future<Output = Option<T>>,
        L: FnMut() -> LF,
        LF: Future<Output = Result<(), E>>,
    {
        let mut shutdown = self.shutdown.clone();
        let max = self.policy.max_attempts;

        for attempt in 1..=max {
            let outcome = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => return Err(PollError::Cancelled),
                outcome = check() => outcome,
            };
            if let Some(value) = outcome {
                debug!(%what, attempt, "ready");
                return Ok(Ready {
                    value,
                    attempts: attempt,
                });
            }

            liveness().await.map_err(PollError::Dead)?;

            if attempt == max {
                break;
            }
            debug!(%what, attempt, max, "not ready yet");

            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }

        Err(PollError::TimedOut { attempts: max })
    }
}

/// Resolves once shutdown is requested; never if it no longer can be.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
