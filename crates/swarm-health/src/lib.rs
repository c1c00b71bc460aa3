//! swarm-health — readiness polling and health probes for LLM swarms.
//!
//! # Components
//!
//! - **`poller`** — the single retry primitive: evaluate a readiness
//!   check, re-verify liveness on failure, sleep, repeat. Bounded by an
//!   attempt budget and interruptible by a shutdown signal.
//! - **`probe`** — HTTP health probes against inference servers, with an
//!   engine-specific generation request as fallback for servers that
//!   have no `/health` route.
//!
//! ```text
//! Poller::until(check, liveness)
//!   ├── check()     → Some(value)  ⇒ Ready { value, attempts }
//!   ├── liveness()  → Err(e)       ⇒ PollError::Dead(e)
//!   ├── shutdown                   ⇒ PollError::Cancelled
//!   └── budget spent               ⇒ PollError::TimedOut
//! ```

pub mod error;
pub mod poller;
pub mod probe;

pub use error::PollError;
pub use poller::{PollPolicy, Poller, Ready};
pub use probe::{HealthProbe, HttpProbe, ProbeResult};
