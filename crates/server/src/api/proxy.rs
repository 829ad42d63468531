use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use warden_core::CheckPhase;
use warden_gateway::{ProxyOutcome, ProxyRequest};

use super::AppState;
use super::schemas::{BlockedResponse, FailureResponse};
use crate::error::ServerError;

/// `POST /api/proxy` -- enforce a contract and forward the call upstream.
///
/// Policy headers (`X-API-Key`, `X-Contract-ID`/`X-DC-Id`,
/// `X-Target-Endpoint`, `X-Policy-Digest`) are consumed here and never
/// forwarded. On allow, the upstream response is relayed verbatim minus
/// hop-by-hop headers; on block the caller receives a structured 403 that
/// never echoes payload content.
#[utoipa::path(
    post,
    path = "/api/proxy",
    tag = "Proxy",
    summary = "Enforce and forward",
    description = "Evaluates the named contract's guardrails against the request (and the upstream response), forwarding only when policy allows.",
    responses(
        (status = 200, description = "Upstream response relayed"),
        (status = 403, description = "Blocked by policy", body = BlockedResponse),
        (status = 502, description = "Upstream failure", body = FailureResponse),
        (status = 503, description = "Dependency unavailable", body = FailureResponse),
    )
)]
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let api_key = required_header(&headers, "x-api-key")
        .map_err(|_| ServerError::Unauthorized("missing X-API-Key header".into()))?;
    let contract_id = required_header(&headers, "x-contract-id")
        .or_else(|_| required_header(&headers, "x-dc-id"))
        .map_err(|_| ServerError::BadRequest("missing X-Contract-ID header".into()))?;
    let target = required_header(&headers, "x-target-endpoint")
        .map_err(|_| ServerError::BadRequest("missing X-Target-Endpoint header".into()))?;
    let policy_digest = optional_header(&headers, "x-policy-digest");

    let header_pairs: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();

    let request = ProxyRequest {
        api_key,
        contract_id,
        target,
        policy_digest,
        method: method.as_str().to_owned(),
        path: "/api/proxy".to_owned(),
        headers: header_pairs,
        body,
    };

    Ok(render(state.pipeline.enforce(request).await))
}

fn required_header(headers: &HeaderMap, name: &str) -> Result<String, ()> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .filter(|value| !value.is_empty())
        .ok_or(())
}

fn optional_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn render(outcome: ProxyOutcome) -> Response {
    match outcome {
        ProxyOutcome::Allowed {
            status,
            headers,
            body,
            ..
        } => {
            let mut response = Response::builder().status(status);
            for (name, value) in headers {
                response = response.header(name, value);
            }
            response
                .body(axum::body::Body::from(body))
                .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        ProxyOutcome::Blocked {
            phase,
            contract_id,
            violations,
            trace_id,
        } => {
            let error = match phase {
                CheckPhase::Input => "INPUT_BLOCKED",
                CheckPhase::Output => "OUTPUT_BLOCKED",
            };
            let body = BlockedResponse {
                error: error.to_owned(),
                contract_id,
                violations,
                trace_id,
            };
            (StatusCode::FORBIDDEN, axum::Json(body)).into_response()
        }
        ProxyOutcome::Failed {
            kind,
            message,
            trace_id,
        } => {
            let status =
                StatusCode::from_u16(kind.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = FailureResponse {
                error: kind.code().to_owned(),
                message,
                trace_id,
            };
            (status, axum::Json(body)).into_response()
        }
    }
}
