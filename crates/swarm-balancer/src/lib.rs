//! swarm-balancer — fronts several inference endpoints with one address.
//!
//! Only used when a swarm resolves more than one endpoint. The
//! provisioner:
//!
//! - Picks a free local port by probing a range
//! - Renders the nginx template (`{{servers}}`, `{{port}}`)
//! - Starts nginx in a container and re-emits its output as log events
//! - Polls the proxy's `/health` until it answers
//!
//! # Architecture
//!
//! ```text
//! BalancerProvisioner
//!   ├── port::find_unused_port (bind-then-release scan)
//!   ├── render_config → <logs>/load_balancer.conf
//!   ├── CommandRunner (docker run / logs / inspect / kill)
//!   └── Poller + HealthProbe (http://localhost:<port>/health)
//! ```

pub mod error;
pub mod port;
pub mod provisioner;

pub use error::{BalancerError, BalancerResult};
pub use port::find_unused_port;
pub use provisioner::{BalancerProvisioner, ProxyHandle, render_config};
