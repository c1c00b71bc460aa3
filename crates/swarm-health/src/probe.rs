//! Health probes against inference servers.
//!
//! The primary probe is `GET <endpoint>/health`. Servers that answer
//! 404 there have no dedicated health route; for those a minimal
//! generation request in the engine's own request format stands in.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use tracing::debug;

use swarm_core::{Endpoint, EngineKind};

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The server answered 2xx.
    Healthy,
    /// The server answered, but not with 2xx.
    Unhealthy,
    /// The probe could not be executed (connection error, timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }
}

/// Something that can tell whether an endpoint accepts traffic.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeResult;
}

/// HTTP/1.1 probe for a given inference engine.
#[derive(Debug, Clone, Copy)]
pub struct HttpProbe {
    engine: EngineKind,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(engine: EngineKind, timeout: Duration) -> Self {
        Self { engine, timeout }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeResult {
        let health = endpoint.route("/health");
        match http_request(endpoint, Method::GET, &health, None, self.timeout).await {
            Some(StatusCode::NOT_FOUND) => {
                debug!(%endpoint, engine = %self.engine, "no health route, probing generation");
                let generate = endpoint.route("/generate");
                let body = generation_probe_body(self.engine);
                classify(http_request(endpoint, Method::POST, &generate, Some(body), self.timeout).await)
            }
            status => classify(status),
        }
    }
}

fn classify(status: Option<StatusCode>) -> ProbeResult {
    match status {
        Some(s) if s.is_success() => ProbeResult::Healthy,
        Some(_) => ProbeResult::Unhealthy,
        None => ProbeResult::Failed,
    }
}

/// Smallest request each engine accepts on `/generate`.
pub fn generation_probe_body(engine: EngineKind) -> Bytes {
    let body = match engine {
        EngineKind::Tgi => serde_json::json!({
            "inputs": "ping",
            "parameters": { "max_new_tokens": 1 },
        }),
        EngineKind::Vllm => serde_json::json!({
            "prompt": "ping",
            "max_tokens": 1,
        }),
    };
    Bytes::from(body.to_string())
}

/// Send one request and return the status, or `None` if no response
/// arrived within `timeout`.
pub async fn http_request(
    endpoint: &Endpoint,
    method: Method,
    path: &str,
    body: Option<Bytes>,
    timeout: Duration,
) -> Option<StatusCode> {
    let address = endpoint.authority();
    let uri = format!("{}://{address}{path}", endpoint.scheme());
    if endpoint.scheme() != "http" {
        debug!(%uri, "only plain http endpoints can be probed");
        return None;
    }

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(&address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "probe connection failed");
                return None;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "probe handshake failed");
                return None;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(path)
            .header("host", &address)
            .header("user-agent", "llm-swarm/0.1");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let req = match builder.body(Full::new(body.unwrap_or_default())) {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "invalid probe request");
                return None;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    debug!(status = %resp.status(), %uri, "probe non-2xx");
                }
                Some(resp.status())
            }
            Err(e) => {
                debug!(error = %e, %uri, "probe request failed");
                None
            }
        }
    })
    .await;

    match result {
        Ok(status) => status,
        Err(_) => {
            debug!(%uri, "probe timed out");
            None
        }
    }
}
