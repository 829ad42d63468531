pub mod guardrails;
pub mod health;
pub mod openapi;
pub mod prometheus;
pub mod proxy;
pub mod schemas;
pub mod stream;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use warden_cache::CacheStore;
use warden_core::BreakerSet;
use warden_embedding::EmbeddingMetrics;
use warden_gateway::EnforcementPipeline;
use warden_guardrails::GuardrailRegistry;
use warden_telemetry::TelemetryHandle;

use self::openapi::ApiDoc;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The enforcement pipeline.
    pub pipeline: Arc<EnforcementPipeline>,
    /// Guardrail registry (shared with the pipeline).
    pub registry: Arc<GuardrailRegistry>,
    /// Telemetry producer handle (stream subscription + drop counter).
    pub telemetry: TelemetryHandle,
    /// Circuit breaker table for health reporting.
    pub breakers: Arc<BreakerSet>,
    /// Cache handle for hit/miss reporting.
    pub cache: Arc<dyn CacheStore>,
    /// Embedding metrics when a semantic backend is configured.
    pub embedding_metrics: Option<Arc<EmbeddingMetrics>>,
    /// Crate version reported on `/health`.
    pub version: &'static str,
}

/// Build the Axum router with all routes, middleware, and Swagger UI.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Proxy endpoint
        .route("/api/proxy", post(proxy::proxy))
        // Health & metrics
        .route("/health", get(health::health))
        .route("/metrics", get(prometheus::metrics))
        // Guardrail admin
        .route("/api/guardrails/register", post(guardrails::register))
        .route("/api/guardrails/list", get(guardrails::list))
        .route("/api/guardrails/configs/{id}", get(guardrails::config))
        // Live decision stream
        .route("/api/telemetry/stream", get(stream::stream))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
