//! swarm-core — shared building blocks for the LLM swarm crates.
//!
//! - **`config`** — `SwarmConfig`, TOML loading, construction-time validation
//! - **`types`** — job handles, derived job state, engine and scheduler kinds
//! - **`endpoint`** — network endpoints exposed by inference servers
//! - **`template`** — `{{token}}` substitution for job and proxy templates
//! - **`command`** — the `CommandRunner` seam used to drive cluster tools
//! - **`testing`** — a scripted `CommandRunner` for tests

pub mod command;
pub mod config;
pub mod endpoint;
pub mod template;
pub mod testing;
pub mod types;

pub use command::{CommandError, CommandRunner, SystemRunner, render_command};
pub use config::{ConfigError, SwarmConfig, parse_duration};
pub use endpoint::{Endpoint, EndpointError};
pub use template::Template;
pub use types::*;
