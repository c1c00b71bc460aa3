//! swarm-controller — the LLM swarm lifecycle.
//!
//! Coordinates a scheduler backend, the readiness poller, health probes
//! and the load balancer to turn a [`SwarmConfig`](swarm_core::SwarmConfig)
//! into one reachable endpoint, and back into nothing on release.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ─▶ Submitting ─▶ AwaitingJobs ─▶ AwaitingEndpoints ─┬─▶ Serving ─▶ Released
//!  │                                                      └─▶ AwaitingLoadBalancer ─▶ Serving
//!  └── debug endpoint ─────────────────────────────────────────▶ Serving
//!
//! any failure after Submitting ─▶ cancel jobs ─▶ Failed { reason }
//! ```

pub mod controller;
pub mod error;
pub mod resolver;
pub mod session;
pub mod state;

pub use controller::{SwarmController, suggested_max_parallel_requests};
pub use error::{SwarmError, SwarmResult};
pub use resolver::EndpointResolver;
pub use session::SwarmSession;
pub use state::SwarmState;
