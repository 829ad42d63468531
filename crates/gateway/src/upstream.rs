use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, warn};

/// Hop-by-hop headers never forwarded in either direction (RFC 7230 §6.1),
/// plus framing headers the client re-computes.
const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Policy headers consumed by the gateway and removed before forwarding.
const POLICY_HEADERS: [&str; 5] = [
    "x-api-key",
    "x-contract-id",
    "x-dc-id",
    "x-target-endpoint",
    "x-policy-digest",
];

/// Whether a header is hop-by-hop and must not be forwarded.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Whether a header belongs to the gateway's policy surface.
pub fn is_policy_header(name: &str) -> bool {
    POLICY_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Errors from the upstream exchange.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The target URL is not an absolute http(s) URL.
    #[error("invalid target endpoint: {0}")]
    InvalidTarget(String),

    /// The target URL does not match the configured allowlist.
    #[error("target endpoint not in allowlist: {0}")]
    TargetNotAllowed(String),

    /// The upstream did not answer within the deadline.
    #[error("upstream request timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("upstream connection error: {0}")]
    Connect(String),

    /// The response body could not be read.
    #[error("upstream body error: {0}")]
    Body(String),
}

/// Upstream proxy configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// URL prefixes callers may target; empty allows any http(s) URL.
    pub allowlist: Vec<String>,
    /// Per-request upstream deadline.
    pub timeout: Duration,
    /// Largest body buffered for post-checking.
    pub max_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            timeout: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// A buffered upstream response ready for post-checking.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// Upstream status code.
    pub status: u16,
    /// Upstream headers minus hop-by-hop entries.
    pub headers: Vec<(String, String)>,
    /// Buffered body.
    pub body: Bytes,
    /// False when the body exceeded the buffering bound; such responses pass
    /// through unchecked and are flagged in telemetry.
    pub post_check_eligible: bool,
}

/// Streams caller requests to their declared upstream endpoint.
///
/// Forwards method and pass-through headers, strips hop-by-hop and policy
/// headers, validates targets against the allowlist, and buffers responses
/// up to the configured bound for post-checking.
pub struct UpstreamProxy {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamProxy {
    /// Create a proxy with the given configuration.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Validate a target URL against scheme and allowlist rules.
    pub fn validate_target(&self, target: &str) -> Result<(), UpstreamError> {
        if !target.starts_with("http://") && !target.starts_with("https://") {
            return Err(UpstreamError::InvalidTarget(target.to_owned()));
        }
        if !self.config.allowlist.is_empty()
            && !self.config.allowlist.iter().any(|prefix| target.starts_with(prefix))
        {
            return Err(UpstreamError::TargetNotAllowed(target.to_owned()));
        }
        Ok(())
    }

    /// Forward a request and buffer the response.
    ///
    /// `headers` must already be filtered to pass-through entries; the proxy
    /// drops any hop-by-hop or policy header defensively.
    pub async fn forward(
        &self,
        method: &str,
        target: &str,
        headers: &[(String, String)],
        body: Bytes,
        deadline: Instant,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.validate_target(target)?;

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| UpstreamError::InvalidTarget(format!("bad method {method}")))?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(UpstreamError::Timeout);
        }

        let mut request = self
            .client
            .request(method, target)
            .timeout(remaining.min(self.config.timeout))
            .body(body);

        for (name, value) in headers {
            if is_hop_by_hop(name) || is_policy_header(name) {
                continue;
            }
            request = request.header(name, value);
        }

        debug!(%target, "forwarding request upstream");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();

        // Buffer the body; past the bound the response is still relayed but
        // no longer eligible for post-checking.
        let mut buffer = BytesMut::new();
        let mut post_check_eligible = true;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Body(e.to_string())
                }
            })?;
            buffer.extend_from_slice(&chunk);
            if post_check_eligible && buffer.len() > self.config.max_body_bytes {
                warn!(
                    bytes = buffer.len(),
                    bound = self.config.max_body_bytes,
                    "upstream response exceeds post-check bound"
                );
                post_check_eligible = false;
            }
        }

        Ok(UpstreamResponse {
            status,
            headers: response_headers,
            body: buffer.freeze(),
            post_check_eligible,
        })
    }
}

impl std::fmt::Debug for UpstreamProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamProxy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(allowlist: Vec<String>) -> UpstreamProxy {
        UpstreamProxy::new(UpstreamConfig {
            allowlist,
            timeout: Duration::from_secs(5),
            max_body_bytes: 1024,
        })
        .unwrap()
    }

    #[test]
    fn header_classification() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("authorization"));

        assert!(is_policy_header("X-Contract-ID"));
        assert!(is_policy_header("x-dc-id"));
        assert!(is_policy_header("X-Target-Endpoint"));
        assert!(!is_policy_header("content-type"));
    }

    #[test]
    fn empty_allowlist_allows_any_http_url() {
        let proxy = proxy(vec![]);
        assert!(proxy.validate_target("https://api.openai.com/v1/chat").is_ok());
        assert!(proxy.validate_target("http://localhost:9000/x").is_ok());
    }

    #[test]
    fn non_http_targets_rejected() {
        let proxy = proxy(vec![]);
        assert!(matches!(
            proxy.validate_target("ftp://example.com"),
            Err(UpstreamError::InvalidTarget(_))
        ));
        assert!(matches!(
            proxy.validate_target("not a url"),
            Err(UpstreamError::InvalidTarget(_))
        ));
    }

    #[test]
    fn allowlist_is_prefix_matched() {
        let proxy = proxy(vec!["https://api.openai.com/".into()]);
        assert!(proxy.validate_target("https://api.openai.com/v1/chat").is_ok());
        assert!(matches!(
            proxy.validate_target("https://evil.example.com/v1"),
            Err(UpstreamError::TargetNotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn forwards_and_buffers_response() {
        let (addr, handle) = spawn_echo_upstream().await;
        let proxy = proxy(vec![]);

        let response = proxy
            .forward(
                "POST",
                &format!("http://{addr}/echo"),
                &[("content-type".to_owned(), "application/json".to_owned())],
                Bytes::from_static(b"{\"hello\":true}"),
                Instant::now() + Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.post_check_eligible);
        assert_eq!(response.body.as_ref(), b"{\"hello\":true}");
        handle.abort();
    }

    #[tokio::test]
    async fn oversize_response_loses_post_check_eligibility() {
        let (addr, handle) = spawn_big_upstream(4096).await;
        let proxy = proxy(vec![]);

        let response = proxy
            .forward(
                "POST",
                &format!("http://{addr}/big"),
                &[],
                Bytes::new(),
                Instant::now() + Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(!response.post_check_eligible);
        assert_eq!(response.body.len(), 4096);
        handle.abort();
    }

    #[tokio::test]
    async fn expired_deadline_fails_without_io() {
        let proxy = proxy(vec![]);
        let result = proxy
            .forward(
                "POST",
                "http://127.0.0.1:1/never",
                &[],
                Bytes::new(),
                Instant::now() - Duration::from_secs(1),
            )
            .await;
        assert!(matches!(result, Err(UpstreamError::Timeout)));
    }

    async fn spawn_echo_upstream() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        use axum::Router;
        use axum::routing::post;

        let app = Router::new().route("/echo", post(|body: Bytes| async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, handle)
    }

    async fn spawn_big_upstream(
        bytes: usize,
    ) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        use axum::Router;
        use axum::routing::post;

        let app = Router::new().route(
            "/big",
            post(move || async move { vec![b'x'; bytes] }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, handle)
    }
}
