use std::time::Duration;

/// Enforcement pipeline configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Total per-request deadline covering resolution, checks, and the
    /// upstream exchange.
    pub request_timeout: Duration,
    /// When true, a resolver outage (circuit open, source down) lets the
    /// request through unenforced instead of failing with 503. Off by
    /// default; enabling it trades enforcement for availability.
    pub fail_open: bool,
    /// Largest response body that will be buffered for post-checking.
    /// Larger responses pass through unchecked and are flagged in telemetry.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            fail_open: false,
            max_body_bytes: 1024 * 1024,
        }
    }
}
