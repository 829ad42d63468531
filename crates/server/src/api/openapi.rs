use utoipa::OpenApi;

use super::schemas;

/// OpenAPI document served at `/api-doc/openapi.json` and browsable through
/// the Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warden",
        description = "Policy-enforcement proxy for AI/LLM traffic: contract-bound guardrail evaluation on requests and responses, with audit telemetry.",
    ),
    paths(
        super::proxy::proxy,
        super::health::health,
        super::prometheus::metrics,
        super::guardrails::register,
        super::guardrails::list,
        super::guardrails::config,
        super::stream::stream,
    ),
    components(schemas(
        schemas::HealthResponse,
        schemas::CacheStats,
        schemas::BlockedResponse,
        schemas::FailureResponse,
        schemas::RegisterResponse,
        schemas::GuardrailSummary,
        schemas::GuardrailListResponse,
        warden_core::Guardrail,
        warden_core::Violation,
    )),
    tags(
        (name = "Proxy", description = "Enforcement proxy endpoint"),
        (name = "Health", description = "Health and metrics"),
        (name = "Guardrails", description = "Guardrail registry administration"),
        (name = "Telemetry", description = "Live decision stream"),
    )
)]
pub struct ApiDoc;
