use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use warden_core::Guardrail;

use super::AppState;
use super::schemas::{GuardrailListResponse, GuardrailSummary, RegisterResponse};

/// `POST /api/guardrails/register` -- register or replace a dynamic
/// guardrail. Idempotent on id; replacement swaps the entry atomically.
#[utoipa::path(
    post,
    path = "/api/guardrails/register",
    tag = "Guardrails",
    summary = "Register a guardrail",
    request_body = Guardrail,
    responses(
        (status = 200, description = "Guardrail registered", body = RegisterResponse),
        (status = 400, description = "Invalid guardrail configuration"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(guardrail): Json<Guardrail>,
) -> impl IntoResponse {
    let id = guardrail.id.clone();
    match state.registry.register_dynamic(guardrail) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "guardrail_id": id,
                "source": "dynamic",
            })),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "guardrail_id": id,
                "error": e.to_string(),
            })),
        ),
    }
}

/// `GET /api/guardrails/list` -- static and dynamic guardrails merged, each
/// tagged with its origin.
#[utoipa::path(
    get,
    path = "/api/guardrails/list",
    tag = "Guardrails",
    summary = "List guardrails",
    responses(
        (status = 200, description = "Registered guardrails", body = GuardrailListResponse)
    )
)]
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let guardrails = state
        .registry
        .list()
        .iter()
        .map(|g| GuardrailSummary {
            id: g.id.clone(),
            origin: g.origin.to_string(),
            name: g.name.clone(),
            kind: g.kind.type_tag().to_owned(),
            metric_name: Some(g.metric_name.clone()),
        })
        .collect();

    (StatusCode::OK, Json(GuardrailListResponse { guardrails }))
}

/// `GET /api/guardrails/configs/{id}` -- full stored configuration for a
/// registered guardrail.
#[utoipa::path(
    get,
    path = "/api/guardrails/configs/{id}",
    tag = "Guardrails",
    summary = "Get a guardrail config",
    params(("id" = String, Path, description = "Guardrail id")),
    responses(
        (status = 200, description = "Stored configuration", body = Guardrail),
        (status = 404, description = "Unknown guardrail id"),
    )
)]
pub async fn config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&id) {
        Some(guardrail) => (
            StatusCode::OK,
            Json(serde_json::to_value(&*guardrail).unwrap_or_default()),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "NOT_FOUND",
                "message": format!("guardrail '{id}' is not registered"),
            })),
        ),
    }
}
