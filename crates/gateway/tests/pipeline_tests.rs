use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::routing::post;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};

use warden_cache::{CacheStore, MemoryCache};
use warden_contract::{ContractStore, StaticContractSource};
use warden_core::{
    CheckPhase, CircuitBreaker, CircuitBreakerConfig, Contract, ContractStatus, EnforcementFlags,
    EnvelopeBound, EnvelopePhase, Guardrail, GuardrailKind, GuardrailOrigin, Severity,
    WeightedKeyword, WeightedPattern,
};
use warden_gateway::{FailureKind, GatewayBuilder, GatewayConfig, ProxyOutcome, ProxyRequest};
use warden_guardrails::{EvaluatorTimeouts, Evaluators, GuardrailRegistry};
use warden_telemetry::{TelemetryHandle, TelemetryRecord};

/// Upstream echo server counting the calls that reach it.
async fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |body: Bytes| {
            let hits = Arc::clone(&hits_clone);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let text = String::from_utf8_lossy(&body).into_owned();
                axum::Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": text}}]
                }))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn healthcare_contract(envelope: HashMap<String, EnvelopeBound>) -> Contract {
    Contract {
        id: "demo-healthcare".into(),
        name: "Demo healthcare".into(),
        industry: Some("healthcare".into()),
        policy_digest: "digest-1".into(),
        issued_at: Utc::now() - ChronoDuration::hours(1),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        status: ContractStatus::Active,
        enforcement: EnforcementFlags::default(),
        guardrails: vec!["pii_blocker".into()],
        dag: None,
        envelope,
        extensions: serde_json::Map::new(),
    }
}

struct Harness {
    pipeline: warden_gateway::EnforcementPipeline,
    telemetry_rx: tokio::sync::mpsc::Receiver<TelemetryRecord>,
    upstream_hits: Arc<AtomicUsize>,
    upstream_addr: SocketAddr,
}

async fn harness(contracts: Vec<Contract>, config: GatewayConfig) -> Harness {
    let (upstream_addr, upstream_hits) = spawn_upstream().await;
    let (telemetry, telemetry_rx) = TelemetryHandle::channel(64);

    let registry = Arc::new(GuardrailRegistry::with_builtins());
    registry
        .register(Guardrail {
            id: "hipaa_scorer".into(),
            name: "HIPAA scorer".into(),
            description: String::new(),
            metric_name: "hipaa_compliance".into(),
            // Threshold above 1.0 is rejected by validation, so use an
            // inverted score: high raw keyword score -> low compliance.
            threshold: 1.0,
            invert_score: true,
            severity: Severity::High,
            kind: GuardrailKind::Keyword {
                keywords: vec![WeightedKeyword {
                    keyword: "unencrypted".into(),
                    weight: 4.0,
                }],
                ceiling: 10.0,
            },
            origin: GuardrailOrigin::Static,
        })
        .unwrap();

    let pipeline = GatewayBuilder::new()
        .contracts(Arc::new(ContractStore::new(
            Arc::new(MemoryCache::new(64)),
            Arc::new(StaticContractSource::new(contracts)),
            Arc::new(CircuitBreaker::new(
                "contract_source",
                CircuitBreakerConfig::default(),
            )),
            Duration::from_secs(300),
        )))
        .registry(registry)
        .evaluators(Arc::new(Evaluators::new(EvaluatorTimeouts::default())))
        .telemetry(telemetry)
        .config(config)
        .build()
        .unwrap();

    Harness {
        pipeline,
        telemetry_rx,
        upstream_hits,
        upstream_addr,
    }
}

fn chat_request(addr: SocketAddr, contract_id: &str, content: &str) -> ProxyRequest {
    let body = serde_json::json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": content}]
    });
    ProxyRequest {
        api_key: "tenant-key-1".into(),
        contract_id: contract_id.into(),
        target: format!("http://{addr}/v1/chat/completions"),
        policy_digest: None,
        method: "POST".into(),
        path: "/api/proxy".into(),
        headers: vec![("content-type".into(), "application/json".into())],
        body: Bytes::from(body.to_string()),
    }
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<TelemetryRecord>) -> Vec<TelemetryRecord> {
    let mut records = Vec::new();
    while let Ok(record) = rx.try_recv() {
        records.push(record);
    }
    records
}

#[tokio::test]
async fn pii_in_input_is_blocked_before_upstream() {
    let mut h = harness(vec![healthcare_contract(HashMap::new())], GatewayConfig::default()).await;

    let outcome = h
        .pipeline
        .enforce(chat_request(
            h.upstream_addr,
            "demo-healthcare",
            "My SSN is 123-45-6789.",
        ))
        .await;

    match outcome {
        ProxyOutcome::Blocked {
            phase, violations, ..
        } => {
            assert_eq!(phase, CheckPhase::Input);
            let v = violations
                .iter()
                .find(|v| v.metric == "pii_risk")
                .expect("pii_risk violation");
            assert!(v.value >= 0.5);
        }
        other => panic!("expected block, got {other:?}"),
    }

    // Invariant: no upstream call on pre-check block.
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 0);

    // Exactly one request record plus one input-phase violation record.
    let records = drain(&mut h.telemetry_rx);
    let requests: Vec<_> = records
        .iter()
        .filter(|r| matches!(r, TelemetryRecord::Request(_)))
        .collect();
    assert_eq!(requests.len(), 1);
    let violations: Vec<_> = records
        .iter()
        .filter_map(|r| match r {
            TelemetryRecord::Violation(v) => Some(v),
            TelemetryRecord::Request(_) => None,
        })
        .collect();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].phase, CheckPhase::Input);
}

#[tokio::test]
async fn clean_input_passes_through() {
    let mut h = harness(vec![healthcare_contract(HashMap::new())], GatewayConfig::default()).await;

    let outcome = h
        .pipeline
        .enforce(chat_request(
            h.upstream_addr,
            "demo-healthcare",
            "What are visiting hours?",
        ))
        .await;

    match outcome {
        ProxyOutcome::Allowed { status, body, .. } => {
            assert_eq!(status, 200);
            assert!(String::from_utf8_lossy(&body).contains("visiting hours"));
        }
        other => panic!("expected allow, got {other:?}"),
    }
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 1);

    let records = drain(&mut h.telemetry_rx);
    assert_eq!(records.len(), 1, "one request record, zero violations");
    match &records[0] {
        TelemetryRecord::Request(r) => {
            assert_eq!(r.decision, "allowed");
            assert_eq!(r.status, 200);
        }
        TelemetryRecord::Violation(_) => panic!("unexpected violation record"),
    }
}

#[tokio::test]
async fn envelope_violation_on_output_blocks_with_bounds() {
    let envelope = HashMap::from([(
        "hipaa_compliance".to_owned(),
        EnvelopeBound {
            min: 0.8,
            max: 1.0,
            phase: EnvelopePhase::Response,
            severity: Severity::High,
        },
    )]);
    let mut contract = healthcare_contract(envelope);
    contract.guardrails = vec!["hipaa_scorer".into()];

    let mut h = harness(vec![contract], GatewayConfig::default()).await;

    // The echo upstream reflects the request content: "unencrypted" appears
    // once, keyword raw 0.4, inverted hipaa_compliance = 0.6 < min 0.8.
    let outcome = h
        .pipeline
        .enforce(chat_request(
            h.upstream_addr,
            "demo-healthcare",
            "send unencrypted patient data",
        ))
        .await;

    match outcome {
        ProxyOutcome::Blocked {
            phase, violations, ..
        } => {
            assert_eq!(phase, CheckPhase::Output);
            let v = violations
                .iter()
                .find(|v| v.metric == "hipaa_compliance")
                .expect("hipaa_compliance violation");
            assert!((v.value - 0.6).abs() < 1e-9);
            assert_eq!(v.min, Some(0.8));
            assert_eq!(v.max, Some(1.0));
        }
        other => panic!("expected output block, got {other:?}"),
    }

    let records = drain(&mut h.telemetry_rx);
    let violation = records
        .iter()
        .find_map(|r| match r {
            TelemetryRecord::Violation(v) => Some(v),
            TelemetryRecord::Request(_) => None,
        })
        .expect("violation record");
    assert_eq!(violation.violation_type, "envelope");
    assert_eq!(violation.phase, CheckPhase::Output);
}

#[tokio::test]
async fn upstream_body_never_reaches_caller_on_output_block() {
    let envelope = HashMap::from([(
        "hipaa_compliance".to_owned(),
        EnvelopeBound {
            min: 0.8,
            max: 1.0,
            phase: EnvelopePhase::Response,
            severity: Severity::High,
        },
    )]);
    let mut contract = healthcare_contract(envelope);
    contract.guardrails = vec!["hipaa_scorer".into()];

    let mut h = harness(vec![contract], GatewayConfig::default()).await;
    let outcome = h
        .pipeline
        .enforce(chat_request(
            h.upstream_addr,
            "demo-healthcare",
            "send unencrypted patient data",
        ))
        .await;

    // The upstream was called, but its body is dropped from the outcome.
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 1);
    match outcome {
        ProxyOutcome::Blocked { violations, .. } => {
            let serialized = serde_json::to_string(&violations).unwrap();
            assert!(!serialized.contains("unencrypted patient data"));
        }
        other => panic!("expected block, got {other:?}"),
    }
    let _ = drain(&mut h.telemetry_rx);
}

#[tokio::test]
async fn unknown_contract_fails_without_upstream_call() {
    let mut h = harness(vec![], GatewayConfig::default()).await;

    let outcome = h
        .pipeline
        .enforce(chat_request(h.upstream_addr, "missing-contract", "hello"))
        .await;

    match outcome {
        ProxyOutcome::Failed { kind, .. } => {
            assert_eq!(kind, FailureKind::ContractNotFound);
            assert_eq!(kind.status(), 404);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 0);

    let records = drain(&mut h.telemetry_rx);
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn policy_digest_mismatch_is_invalid() {
    let mut h = harness(vec![healthcare_contract(HashMap::new())], GatewayConfig::default()).await;

    let mut request = chat_request(h.upstream_addr, "demo-healthcare", "hello");
    request.policy_digest = Some("wrong-digest".into());

    let outcome = h.pipeline.enforce(request).await;
    match outcome {
        ProxyOutcome::Failed { kind, .. } => {
            assert_eq!(kind, FailureKind::Invalid);
            assert_eq!(kind.status(), 400);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.upstream_hits.load(Ordering::SeqCst), 0);
    let _ = drain(&mut h.telemetry_rx);
}

#[tokio::test]
async fn matching_policy_digest_passes() {
    let mut h = harness(vec![healthcare_contract(HashMap::new())], GatewayConfig::default()).await;

    let mut request = chat_request(h.upstream_addr, "demo-healthcare", "hello");
    request.policy_digest = Some("digest-1".into());

    assert!(matches!(
        h.pipeline.enforce(request).await,
        ProxyOutcome::Allowed { .. }
    ));
    let _ = drain(&mut h.telemetry_rx);
}

#[tokio::test]
async fn resolver_outage_fails_closed_by_default() {
    let source = Arc::new(StaticContractSource::new(vec![healthcare_contract(
        HashMap::new(),
    )]));
    source.set_failing(true);

    let (telemetry, mut rx) = TelemetryHandle::channel(64);
    let (upstream_addr, upstream_hits) = spawn_upstream().await;

    let pipeline = GatewayBuilder::new()
        .contracts(Arc::new(ContractStore::new(
            Arc::new(MemoryCache::new(64)),
            source,
            Arc::new(CircuitBreaker::new(
                "contract_source",
                CircuitBreakerConfig::default(),
            )),
            Duration::from_secs(300),
        )))
        .registry(Arc::new(GuardrailRegistry::with_builtins()))
        .evaluators(Arc::new(Evaluators::new(EvaluatorTimeouts::default())))
        .telemetry(telemetry)
        .build()
        .unwrap();

    let outcome = pipeline
        .enforce(chat_request(upstream_addr, "demo-healthcare", "hello"))
        .await;
    match outcome {
        ProxyOutcome::Failed { kind, .. } => {
            assert_eq!(kind, FailureKind::Unavailable);
            assert_eq!(kind.status(), 503);
        }
        other => panic!("expected 503 failure, got {other:?}"),
    }
    assert_eq!(upstream_hits.load(Ordering::SeqCst), 0);
    let _ = drain(&mut rx);
}

#[tokio::test]
async fn resolver_outage_with_fail_open_proceeds_unenforced() {
    let source = Arc::new(StaticContractSource::new(vec![]));
    source.set_failing(true);

    let (telemetry, mut rx) = TelemetryHandle::channel(64);
    let (upstream_addr, upstream_hits) = spawn_upstream().await;

    let pipeline = GatewayBuilder::new()
        .contracts(Arc::new(ContractStore::new(
            Arc::new(MemoryCache::new(64)),
            source,
            Arc::new(CircuitBreaker::new(
                "contract_source",
                CircuitBreakerConfig::default(),
            )),
            Duration::from_secs(300),
        )))
        .registry(Arc::new(GuardrailRegistry::with_builtins()))
        .evaluators(Arc::new(Evaluators::new(EvaluatorTimeouts::default())))
        .telemetry(telemetry)
        .config(GatewayConfig {
            fail_open: true,
            ..GatewayConfig::default()
        })
        .build()
        .unwrap();

    // PII that would normally block sails through: fail-open skips
    // enforcement entirely (and the metrics record the bypass).
    let outcome = pipeline
        .enforce(chat_request(
            upstream_addr,
            "demo-healthcare",
            "My SSN is 123-45-6789.",
        ))
        .await;
    assert!(matches!(outcome, ProxyOutcome::Allowed { .. }));
    assert_eq!(upstream_hits.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.metrics().snapshot().fail_open_passes, 1);
    let _ = drain(&mut rx);
}

#[tokio::test]
async fn every_outcome_carries_matching_trace_ids() {
    let mut h = harness(vec![healthcare_contract(HashMap::new())], GatewayConfig::default()).await;

    let outcome = h
        .pipeline
        .enforce(chat_request(h.upstream_addr, "demo-healthcare", "clean"))
        .await;
    let trace_id = outcome.trace_id().to_owned();

    let records = drain(&mut h.telemetry_rx);
    assert!(records.iter().all(|r| r.trace_id() == trace_id));
}

#[tokio::test]
async fn hot_verdicts_are_reused_from_the_result_cache() {
    let (upstream_addr, _) = spawn_upstream().await;
    let (telemetry, mut rx) = TelemetryHandle::channel(64);
    let result_cache = Arc::new(MemoryCache::new(64));

    let pipeline = GatewayBuilder::new()
        .contracts(Arc::new(ContractStore::new(
            Arc::new(MemoryCache::new(64)),
            Arc::new(StaticContractSource::new(vec![healthcare_contract(
                HashMap::new(),
            )])),
            Arc::new(CircuitBreaker::new(
                "contract_source",
                CircuitBreakerConfig::default(),
            )),
            Duration::from_secs(300),
        )))
        .registry(Arc::new(GuardrailRegistry::with_builtins()))
        .evaluators(Arc::new(Evaluators::new(EvaluatorTimeouts::default())))
        .telemetry(telemetry)
        .result_cache(Arc::clone(&result_cache) as _, Duration::from_secs(60))
        .build()
        .unwrap();

    let request = chat_request(upstream_addr, "demo-healthcare", "My SSN is 123-45-6789.");

    let first = pipeline.enforce(request.clone()).await;
    assert!(matches!(first, ProxyOutcome::Blocked { .. }));

    let second = pipeline.enforce(request).await;
    match second {
        ProxyOutcome::Blocked { violations, .. } => {
            // The cached verdict carries the same violations.
            assert!(violations.iter().any(|v| v.metric == "pii_risk"));
        }
        other => panic!("expected block, got {other:?}"),
    }

    // The second check was served from the result cache.
    assert!(result_cache.stats().hits >= 1);
    let _ = drain(&mut rx);
}

#[tokio::test]
async fn dag_and_short_circuit_skips_second_guardrail() {
    // AND(pii_blocker, toxicity_detector): PII alone blocks and the
    // toxicity leaf is never evaluated.
    let mut contract = healthcare_contract(HashMap::new());
    contract.guardrails = vec!["pii_blocker".into(), "toxicity_detector".into()];

    let mut h = harness(vec![contract], GatewayConfig::default()).await;
    let outcome = h
        .pipeline
        .enforce(chat_request(
            h.upstream_addr,
            "demo-healthcare",
            "SSN 123-45-6789 but otherwise friendly",
        ))
        .await;

    match outcome {
        ProxyOutcome::Blocked { violations, .. } => {
            assert!(violations.iter().any(|v| v.metric == "pii_risk"));
            assert!(!violations.iter().any(|v| v.metric == "toxicity"));
        }
        other => panic!("expected block, got {other:?}"),
    }
    let _ = drain(&mut h.telemetry_rx);
}
