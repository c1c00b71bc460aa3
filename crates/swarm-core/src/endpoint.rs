//! Network endpoints exposed by inference servers and the load balancer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A reachable network address: `scheme://host[:port][/path]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    scheme: String,
    host: String,
    /// Port as written. `None` means the scheme default.
    port: Option<u16>,
    /// Path suffix, always starting with `/` when present.
    path: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid endpoint: {0}")]
    Invalid(String),
}

impl Endpoint {
    /// Plain-HTTP endpoint on `host:port`.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            port: Some(port),
            path: None,
        }
    }

    /// Parse `http://host:port/path` or `https://host/path`.
    ///
    /// A bare `host:port` (as published by some clusters) is read as HTTP.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let raw = raw.trim();
        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("http".to_string(), raw),
        };
        if scheme != "http" && scheme != "https" {
            return Err(EndpointError::UnsupportedScheme(scheme));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(&rest[idx..])),
            None => (rest, None),
        };
        if authority.is_empty() {
            return Err(EndpointError::Invalid(raw.to_string()));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| EndpointError::Invalid(raw.to_string()))?;
                (host, Some(port))
            }
            None => (authority, None),
        };
        if host.is_empty() {
            return Err(EndpointError::Invalid(raw.to_string()));
        }

        let path = path
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Effective port, falling back to the scheme default.
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.scheme == "https" { 443 } else { 80 })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// `host:port`, as used in proxy upstream lists and TCP connects.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }

    /// Same endpoint with `suffix` appended to the path.
    pub fn with_path(&self, suffix: &str) -> Self {
        let suffix = suffix.trim_end_matches('/');
        if suffix.is_empty() {
            return self.clone();
        }
        let suffix = if suffix.starts_with('/') {
            suffix.to_string()
        } else {
            format!("/{suffix}")
        };
        let mut next = self.clone();
        next.path = Some(match &self.path {
            Some(existing) => format!("{existing}{suffix}"),
            None => suffix,
        });
        next
    }

    /// Request path for `route` relative to this endpoint's own path.
    pub fn route(&self, route: &str) -> String {
        format!("{}{}", self.path.as_deref().unwrap_or(""), route)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_http_with_port() {
        let ep = Endpoint::parse("http://26.0.154.245:13120").unwrap();
        assert_eq!(ep.host(), "26.0.154.245");
        assert_eq!(ep.port(), 13120);
        assert_eq!(ep.path(), None);
        assert_eq!(ep.to_string(), "http://26.0.154.245:13120");
    }

    #[test]
    fn parse_https_without_port_keeps_form() {
        let raw = "https://api-inference.huggingface.co/models/mistralai/Mistral-7B";
        let ep = Endpoint::parse(raw).unwrap();
        assert_eq!(ep.port(), 443);
        assert_eq!(ep.path(), Some("/models/mistralai/Mistral-7B"));
        assert_eq!(ep.to_string(), raw);
    }

    #[test]
    fn bare_authority_defaults_to_http() {
        let ep = Endpoint::parse("10.0.0.7:6969").unwrap();
        assert_eq!(ep, Endpoint::http("10.0.0.7", 6969));
    }

    #[test]
    fn trailing_slash_is_dropped() {
        let ep = Endpoint::parse("http://localhost:8080/").unwrap();
        assert_eq!(ep.to_string(), "http://localhost:8080");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Endpoint::parse("ftp://host:21"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert!(Endpoint::parse("http://host:notaport").is_err());
        assert!(Endpoint::parse("http://").is_err());
        assert!(Endpoint::parse("http://:80").is_err());
    }

    #[test]
    fn with_path_appends() {
        let ep = Endpoint::http("localhost", 50001);
        let gen_ep = ep.with_path("/generate");
        assert_eq!(gen_ep.to_string(), "http://localhost:50001/generate");
        assert_eq!(gen_ep.authority(), ep.authority());
        assert_eq!(ep.with_path(""), ep);
    }

    #[test]
    fn route_is_relative_to_existing_path() {
        let ep = Endpoint::parse("http://h:1/v1").unwrap();
        assert_eq!(ep.route("/health"), "/v1/health");
        assert_eq!(Endpoint::http("h", 1).route("/health"), "/health");
    }
}
