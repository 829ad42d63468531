pub mod builder;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod upstream;

pub use builder::GatewayBuilder;
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use metrics::{GatewayMetrics, LATENCY_BUCKETS_MS, LatencyHistogramSnapshot, MetricsSnapshot};
pub use pipeline::{EnforcementPipeline, FailureKind, ProxyOutcome, ProxyRequest, tenant_fingerprint};
pub use upstream::{UpstreamConfig, UpstreamError, UpstreamProxy, UpstreamResponse, is_hop_by_hop, is_policy_header};
