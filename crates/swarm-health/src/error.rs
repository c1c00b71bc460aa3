//! Polling outcomes other than success.

use thiserror::Error;

/// Why a readiness wait ended without the check passing.
///
/// `E` is whatever the liveness callback reports when the thing being
/// waited on is known to be gone.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError<E> {
    #[error("not ready after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Dead(E),
}
