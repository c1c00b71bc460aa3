//! Local port allocation by bind-then-release probing.
//!
//! The port is free at the moment of the probe only. Another process on
//! the same host can take it before the proxy binds it; running two
//! swarms on one host needs an external port allocator.

use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use tracing::debug;

use crate::error::{BalancerError, BalancerResult};

/// First port in `range` that can be bound on all interfaces.
pub fn find_unused_port(range: RangeInclusive<u16>) -> BalancerResult<u16> {
    let (start, end) = (*range.start(), *range.end());
    for port in range {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(listener) => {
                drop(listener);
                debug!(port, "found unused port");
                return Ok(port);
            }
            Err(_) => continue,
        }
    }
    Err(BalancerError::NoPortAvailable { start, end })
}
