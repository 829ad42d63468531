use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use warden_cache::CacheStore;
use warden_contract::{ContractError, ContractStore};
use warden_core::{
    CheckPhase, CheckPayload, Contract, DagDecision, DagOutcome, Decision, EnforcementContext,
    Violation,
};
use warden_guardrails::{Evaluators, GuardrailRegistry, check_envelope, evaluate_dag};
use warden_telemetry::{RequestRecord, TelemetryHandle, TelemetryRecord, ViolationRecord};

use crate::config::GatewayConfig;
use crate::metrics::GatewayMetrics;
use crate::upstream::{UpstreamProxy, is_hop_by_hop, is_policy_header};

/// Derive the tenant fingerprint recorded in telemetry from the caller
/// credential. The raw key never leaves the request path.
pub fn tenant_fingerprint(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(&digest[..8])
}

/// A proxied request after header extraction, before enforcement.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Caller credential (`X-API-Key`).
    pub api_key: String,
    /// Contract to enforce (`X-Contract-ID` / legacy `X-DC-Id`).
    pub contract_id: String,
    /// Absolute upstream URL (`X-Target-Endpoint`).
    pub target: String,
    /// Expected policy digest, when the caller pins one.
    pub policy_digest: Option<String>,
    /// HTTP method to forward.
    pub method: String,
    /// Request path recorded in telemetry.
    pub path: String,
    /// Headers as received; policy and hop-by-hop entries are stripped
    /// before forwarding.
    pub headers: Vec<(String, String)>,
    /// Raw request body.
    pub body: Bytes,
}

/// Failure classification mapped onto HTTP statuses by the server layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Unknown contract id.
    ContractNotFound,
    /// Contract exists but is revoked.
    ContractRevoked,
    /// Contract exists but is expired.
    ContractExpired,
    /// Contract or request headers are invalid (bad digest, bad target).
    Invalid,
    /// A required dependency is unavailable (circuit open, source down).
    Unavailable,
    /// The upstream call failed or returned 5xx.
    Upstream,
}

impl FailureKind {
    /// HTTP status for the failure.
    pub fn status(self) -> u16 {
        match self {
            Self::ContractNotFound => 404,
            Self::ContractRevoked | Self::ContractExpired => 403,
            Self::Invalid => 400,
            Self::Unavailable => 503,
            Self::Upstream => 502,
        }
    }

    /// Machine-readable error code for the response body.
    pub fn code(self) -> &'static str {
        match self {
            Self::ContractNotFound => "CONTRACT_NOT_FOUND",
            Self::ContractRevoked => "CONTRACT_REVOKED",
            Self::ContractExpired => "CONTRACT_EXPIRED",
            Self::Invalid => "INVALID_REQUEST",
            Self::Unavailable => "DEPENDENCY_UNAVAILABLE",
            Self::Upstream => "UPSTREAM_ERROR",
        }
    }
}

/// Terminal outcome of enforcing one request.
#[derive(Debug)]
pub enum ProxyOutcome {
    /// Upstream response relayed verbatim (minus hop-by-hop headers).
    Allowed {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        trace_id: String,
    },
    /// Blocked by policy in the named phase; the upstream body (if any) is
    /// dropped and never reaches the caller.
    Blocked {
        phase: CheckPhase,
        contract_id: String,
        violations: Vec<Violation>,
        trace_id: String,
    },
    /// Infrastructure failure.
    Failed {
        kind: FailureKind,
        message: String,
        trace_id: String,
    },
}

impl ProxyOutcome {
    /// Trace id attached to every outcome.
    pub fn trace_id(&self) -> &str {
        match self {
            Self::Allowed { trace_id, .. }
            | Self::Blocked { trace_id, .. }
            | Self::Failed { trace_id, .. } => trace_id,
        }
    }
}

/// Violations tagged with their origin for telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaggedViolation {
    violation_type: String,
    violation: Violation,
}

/// Cached outcome of one phase check, keyed by policy digest, phase, and
/// payload hash. Identical payloads under the same policy reuse the verdict
/// within the result TTL.
#[derive(Debug, Serialize, Deserialize)]
struct CachedCheck {
    blocked: bool,
    violations: Vec<TaggedViolation>,
}

/// The per-request enforcement orchestrator.
///
/// Pipeline: resolve contract -> pre-check input -> forward -> post-check
/// output -> respond. A request never reaches upstream when a pre-check
/// guardrail blocks, and a blocked response never reaches the caller. Every
/// terminal state enqueues exactly one request record (plus one violation
/// record per violation) on the telemetry pipeline.
pub struct EnforcementPipeline {
    contracts: Arc<ContractStore>,
    registry: Arc<GuardrailRegistry>,
    evaluators: Arc<Evaluators>,
    upstream: UpstreamProxy,
    telemetry: TelemetryHandle,
    metrics: Arc<GatewayMetrics>,
    config: GatewayConfig,
    /// Short-TTL cache for hot check verdicts; `None` disables reuse.
    result_cache: Option<(Arc<dyn CacheStore>, Duration)>,
}

impl EnforcementPipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        contracts: Arc<ContractStore>,
        registry: Arc<GuardrailRegistry>,
        evaluators: Arc<Evaluators>,
        upstream: UpstreamProxy,
        telemetry: TelemetryHandle,
        metrics: Arc<GatewayMetrics>,
        config: GatewayConfig,
        result_cache: Option<(Arc<dyn CacheStore>, Duration)>,
    ) -> Self {
        Self {
            contracts,
            registry,
            evaluators,
            upstream,
            telemetry,
            metrics,
            config,
            result_cache,
        }
    }

    /// Gateway metrics handle for the admin surface.
    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Guardrail registry handle for the admin surface.
    pub fn registry(&self) -> Arc<GuardrailRegistry> {
        Arc::clone(&self.registry)
    }

    /// Enforce one proxied request end to end.
    #[instrument(skip_all, fields(contract_id = %request.contract_id))]
    pub async fn enforce(&self, request: ProxyRequest) -> ProxyOutcome {
        let started = Instant::now();
        self.metrics.record_request();

        let ctx = EnforcementContext::new(
            tenant_fingerprint(&request.api_key),
            request.contract_id.clone(),
            self.config.request_timeout,
        );
        debug!(trace_id = %ctx.trace_id, "pipeline: resolving");

        // -- Resolving ----------------------------------------------------
        let contract = match self.resolve(&ctx, &request, started).await {
            Ok(contract) => contract,
            Err(outcome) => return outcome,
        };

        if let Some(expected) = &request.policy_digest {
            if let Some(contract) = &contract {
                if *expected != contract.policy_digest {
                    self.metrics.record_resolution_failure();
                    return self.fail(
                        &ctx,
                        &request,
                        started,
                        FailureKind::Invalid,
                        "policy digest mismatch".to_owned(),
                    );
                }
            }
        }

        // Target validation is a request error, not an upstream failure.
        if let Err(e) = self.upstream.validate_target(&request.target) {
            return self.fail(&ctx, &request, started, FailureKind::Invalid, e.to_string());
        }

        // -- PreChecking --------------------------------------------------
        let mut violations: Vec<TaggedViolation> = Vec::new();
        if let Some(contract) = &contract {
            if contract.enforcement.check_on_request {
                debug!(trace_id = %ctx.trace_id, "pipeline: pre-checking");
                let payload = CheckPayload::from_request_bytes(&request.body);
                let blocked = self
                    .check_phase(contract, &payload, &ctx, CheckPhase::Input, &mut violations)
                    .await;
                if blocked {
                    self.metrics.record_blocked_input();
                    return self.block(&ctx, &request, started, CheckPhase::Input, violations, 0);
                }
            }
        }

        // -- Forwarding ---------------------------------------------------
        debug!(trace_id = %ctx.trace_id, target = %request.target, "pipeline: forwarding");
        let pass_headers: Vec<(String, String)> = request
            .headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name) && !is_policy_header(name))
            .cloned()
            .collect();

        let response = match self
            .upstream
            .forward(
                &request.method,
                &request.target,
                &pass_headers,
                request.body.clone(),
                ctx.deadline,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_upstream_failure();
                return self.fail(&ctx, &request, started, FailureKind::Upstream, e.to_string());
            }
        };

        if response.status >= 500 {
            self.metrics.record_upstream_failure();
            return self.fail(
                &ctx,
                &request,
                started,
                FailureKind::Upstream,
                format!("upstream returned status {}", response.status),
            );
        }

        // -- PostChecking -------------------------------------------------
        let mut post_check_skipped = false;
        if let Some(contract) = &contract {
            if contract.enforcement.check_on_response {
                if response.post_check_eligible {
                    debug!(trace_id = %ctx.trace_id, "pipeline: post-checking");
                    let payload = CheckPayload::from_response_bytes(&response.body);
                    let blocked = self
                        .check_phase(contract, &payload, &ctx, CheckPhase::Output, &mut violations)
                        .await;
                    if blocked {
                        self.metrics.record_blocked_output();
                        // The upstream body is dropped; its size still lands
                        // in telemetry.
                        return self.block(
                            &ctx,
                            &request,
                            started,
                            CheckPhase::Output,
                            violations,
                            response.body.len() as u64,
                        );
                    }
                } else {
                    post_check_skipped = true;
                    self.metrics.record_post_check_skipped();
                    warn!(trace_id = %ctx.trace_id, "response too large to post-check, passing through");
                }
            }
        }

        // -- Responding ---------------------------------------------------
        self.metrics.record_allowed();
        self.record_request_telemetry(
            &ctx,
            &request,
            started,
            response.status,
            "allowed",
            response.body.len() as u64,
            post_check_skipped,
        );
        info!(
            trace_id = %ctx.trace_id,
            status = response.status,
            latency_ms = elapsed_ms(started),
            "request allowed"
        );

        ProxyOutcome::Allowed {
            status: response.status,
            headers: response.headers,
            body: response.body,
            trace_id: ctx.trace_id,
        }
    }

    /// Resolve the contract, mapping resolver errors to terminal outcomes.
    /// Under fail-open an `Unavailable` resolve yields `Ok(None)`: the
    /// request proceeds unenforced.
    async fn resolve(
        &self,
        ctx: &EnforcementContext,
        request: &ProxyRequest,
        started: Instant,
    ) -> Result<Option<Arc<Contract>>, ProxyOutcome> {
        match self.contracts.resolve(&request.contract_id).await {
            Ok(contract) => Ok(Some(contract)),
            Err(ContractError::Unavailable(message)) if self.config.fail_open => {
                warn!(
                    trace_id = %ctx.trace_id,
                    %message,
                    "contract source unavailable, proceeding unenforced (fail-open)"
                );
                self.metrics.record_fail_open_pass();
                Ok(None)
            }
            Err(e) => {
                self.metrics.record_resolution_failure();
                let kind = match &e {
                    ContractError::NotFound(_) => FailureKind::ContractNotFound,
                    ContractError::Revoked(_) => FailureKind::ContractRevoked,
                    ContractError::Expired(_) => FailureKind::ContractExpired,
                    ContractError::Invalid { .. } => FailureKind::Invalid,
                    ContractError::Unavailable(_) => FailureKind::Unavailable,
                };
                Err(self.fail(ctx, request, started, kind, e.to_string()))
            }
        }
    }

    /// Run the contract's DAG and envelope over one payload, appending any
    /// violations. Returns whether the phase blocks.
    ///
    /// Identical payloads under the same policy digest reuse their verdict
    /// through the result cache within its TTL; cache errors fall back to a
    /// fresh evaluation.
    async fn check_phase(
        &self,
        contract: &Contract,
        payload: &CheckPayload,
        ctx: &EnforcementContext,
        phase: CheckPhase,
        violations: &mut Vec<TaggedViolation>,
    ) -> bool {
        let cache_key = self
            .result_cache
            .as_ref()
            .map(|_| check_cache_key(contract, payload, phase));
        if let (Some((cache, _)), Some(key)) = (&self.result_cache, &cache_key) {
            match warden_cache::get_json::<CachedCheck>(cache.as_ref(), key).await {
                Ok(Some(cached)) => {
                    debug!(trace_id = %ctx.trace_id, %phase, "check verdict served from cache");
                    violations.extend(cached.violations);
                    return cached.blocked;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(trace_id = %ctx.trace_id, error = %e, "result cache read failed");
                }
            }
        }

        let dag = contract.effective_dag();
        let outcome = evaluate_dag(
            &dag,
            &self.registry,
            &self.evaluators,
            payload,
            ctx.deadline,
            phase,
        )
        .await;

        for result in &outcome.results {
            self.metrics
                .observe_evaluator_latency(result.evaluator, result.latency_ms);
        }

        let mut fresh: Vec<TaggedViolation> = Vec::new();
        let dag_blocked = outcome.decision == DagDecision::Block;
        if dag_blocked {
            fresh.extend(self.guardrail_violations(&outcome, phase));
        }

        let envelope_violations = check_envelope(&contract.envelope, &outcome.merged_metrics(), phase);
        let envelope_blocked = !envelope_violations.is_empty();
        fresh.extend(envelope_violations.into_iter().map(|violation| TaggedViolation {
            violation_type: "envelope".to_owned(),
            violation,
        }));

        let blocked = dag_blocked || envelope_blocked;

        if let (Some((cache, ttl)), Some(key)) = (&self.result_cache, &cache_key) {
            let cached = CachedCheck {
                blocked,
                violations: fresh.clone(),
            };
            if let Err(e) = warden_cache::set_json(cache.as_ref(), key, &cached, *ttl).await {
                warn!(trace_id = %ctx.trace_id, error = %e, "result cache write failed");
            }
        }

        violations.extend(fresh);
        blocked
    }

    /// Violations for every blocking (non-skipped) leaf of a DAG outcome.
    fn guardrail_violations(
        &self,
        outcome: &DagOutcome,
        phase: CheckPhase,
    ) -> Vec<TaggedViolation> {
        outcome
            .results
            .iter()
            .filter(|result| result.decision == Decision::Block && !result.skipped)
            .map(|result| {
                let (severity, threshold) = self
                    .registry
                    .get(&result.guardrail_id)
                    .map_or((warden_core::Severity::High, None), |g| {
                        (g.severity, Some(g.threshold))
                    });
                let metric = result
                    .metrics
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| result.guardrail_id.clone());
                TaggedViolation {
                    violation_type: "guardrail".to_owned(),
                    violation: Violation {
                        metric,
                        value: result.effective_score,
                        min: threshold,
                        max: None,
                        severity,
                        phase,
                        detail: result.reason.clone(),
                    },
                }
            })
            .collect()
    }

    fn block(
        &self,
        ctx: &EnforcementContext,
        request: &ProxyRequest,
        started: Instant,
        phase: CheckPhase,
        violations: Vec<TaggedViolation>,
        response_bytes: u64,
    ) -> ProxyOutcome {
        let decision = match phase {
            CheckPhase::Input => "blocked_input",
            CheckPhase::Output => "blocked_output",
        };

        let guardrail_count = violations
            .iter()
            .filter(|v| v.violation_type == "guardrail")
            .count() as u64;
        let envelope_count = violations.len() as u64 - guardrail_count;
        self.metrics.record_violations(guardrail_count, envelope_count);

        for tagged in &violations {
            self.telemetry
                .record(TelemetryRecord::Violation(ViolationRecord::from_violation(
                    &ctx.tenant_id,
                    &ctx.trace_id,
                    &request.contract_id,
                    &tagged.violation_type,
                    &tagged.violation,
                )));
        }
        self.record_request_telemetry(ctx, request, started, 403, decision, response_bytes, false);

        info!(
            trace_id = %ctx.trace_id,
            %phase,
            violations = violations.len(),
            "request blocked"
        );

        ProxyOutcome::Blocked {
            phase,
            contract_id: request.contract_id.clone(),
            violations: violations.into_iter().map(|t| t.violation).collect(),
            trace_id: ctx.trace_id.clone(),
        }
    }

    fn fail(
        &self,
        ctx: &EnforcementContext,
        request: &ProxyRequest,
        started: Instant,
        kind: FailureKind,
        message: String,
    ) -> ProxyOutcome {
        self.record_request_telemetry(ctx, request, started, kind.status(), "failed", 0, false);
        warn!(trace_id = %ctx.trace_id, kind = kind.code(), %message, "request failed");
        ProxyOutcome::Failed {
            kind,
            message,
            trace_id: ctx.trace_id.clone(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_request_telemetry(
        &self,
        ctx: &EnforcementContext,
        request: &ProxyRequest,
        started: Instant,
        status: u16,
        decision: &str,
        response_bytes: u64,
        post_check_skipped: bool,
    ) {
        self.telemetry
            .record(TelemetryRecord::Request(RequestRecord {
                tenant: ctx.tenant_id.clone(),
                trace_id: ctx.trace_id.clone(),
                contract_id: request.contract_id.clone(),
                method: request.method.clone(),
                path: request.path.clone(),
                status,
                decision: decision.to_owned(),
                latency_ms: elapsed_ms(started),
                request_bytes: request.body.len() as u64,
                response_bytes,
                post_check_skipped,
                timestamp: Utc::now(),
            }));
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Cache key for a phase verdict: policy digest + phase + payload hash.
fn check_cache_key(contract: &Contract, payload: &CheckPayload, phase: CheckPhase) -> String {
    let payload_hash = hex::encode(&Sha256::digest(payload.text().as_bytes())[..16]);
    format!("check:{}:{phase}:{payload_hash}", contract.policy_digest)
}

impl std::fmt::Debug for EnforcementPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnforcementPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
