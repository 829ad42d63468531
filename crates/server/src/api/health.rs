use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::schemas::{CacheStats, HealthResponse};

/// `GET /health` -- service status, circuit states, and cache counters.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Health check",
    description = "Returns service status, per-dependency circuit state, cache counters, and the guardrail count.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let circuit_state = state
        .breakers
        .snapshot()
        .into_iter()
        .map(|(name, circuit)| (name, circuit.to_string()))
        .collect();

    let cache = state.cache.stats();

    let body = HealthResponse {
        status: "ok".into(),
        version: state.version.to_owned(),
        circuit_state,
        cache_stats: CacheStats {
            hits: cache.hits,
            misses: cache.misses,
            hit_ratio: cache.hit_ratio(),
        },
        guardrails_cached: state.registry.len(),
        telemetry_dropped: state.telemetry.dropped(),
    };

    (StatusCode::OK, Json(body))
}
