use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use warden_core::Violation;

/// `GET /health` response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `ok` while the process is serving.
    #[schema(example = "ok")]
    pub status: String,
    /// Crate version.
    #[schema(example = "0.1.0")]
    pub version: String,
    /// Circuit state per external dependency.
    pub circuit_state: std::collections::BTreeMap<String, String>,
    /// Cache hit/miss counters.
    pub cache_stats: CacheStats,
    /// Number of guardrails in the registry (static + dynamic).
    pub guardrails_cached: usize,
    /// Telemetry records dropped due to a full queue.
    pub telemetry_dropped: u64,
}

/// Cache counters exposed on `/health`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

/// 403 body for blocked requests.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BlockedResponse {
    /// `INPUT_BLOCKED` or `OUTPUT_BLOCKED`.
    #[schema(example = "INPUT_BLOCKED")]
    pub error: String,
    /// Contract the request was enforced against.
    pub contract_id: String,
    /// Violations that triggered the block.
    pub violations: Vec<Violation>,
    /// Trace id for correlating with telemetry.
    pub trace_id: String,
}

/// 4xx/5xx body for infrastructure failures.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FailureResponse {
    /// Machine-readable error kind.
    #[schema(example = "DEPENDENCY_UNAVAILABLE")]
    pub error: String,
    /// Short human-readable message. Never echoes payload content.
    pub message: String,
    /// Trace id for correlating with telemetry.
    pub trace_id: String,
}

/// `POST /api/guardrails/register` response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub success: bool,
    pub guardrail_id: String,
    /// `static` or `dynamic`.
    #[schema(example = "dynamic")]
    pub source: String,
}

/// One entry of `GET /api/guardrails/list`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GuardrailSummary {
    pub id: String,
    /// `static` or `dynamic`.
    #[serde(rename = "type")]
    #[schema(example = "static")]
    pub origin: String,
    pub name: String,
    /// Evaluator kind tag.
    #[schema(example = "regex")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
}

/// `GET /api/guardrails/list` response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GuardrailListResponse {
    pub guardrails: Vec<GuardrailSummary>,
}
