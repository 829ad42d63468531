mod hybrid;
mod kernel;
mod keyword;
mod llm_assisted;
mod pattern;
mod smart;

pub use keyword::tokenize;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use warden_core::{
    CheckPhase, CheckPayload, CircuitBreaker, Decision, EvaluationResult, EvaluatorKind, Guardrail,
    GuardrailKind,
};
use warden_embedding::{EmbeddingCache, EmbeddingMetrics};
use warden_llm::JudgeClient;

use self::pattern::CompiledPatterns;
use self::smart::SmartAnchors;

/// Per-kind evaluation deadlines.
#[derive(Debug, Clone)]
pub struct EvaluatorTimeouts {
    /// Budget for regex, keyword, hybrid, smart, and kernel evaluators.
    pub fast: Duration,
    /// Budget for the external judge call inside LLM-assisted evaluators.
    pub llm: Duration,
}

impl Default for EvaluatorTimeouts {
    fn default() -> Self {
        Self {
            fast: Duration::from_millis(200),
            llm: Duration::from_secs(5),
        }
    }
}

/// Embedding backends used by the semantic evaluators.
#[derive(Clone)]
pub struct EmbeddingStack {
    /// Short-TTL cache for per-payload embeddings.
    pub payload: Arc<EmbeddingCache>,
    /// Long-TTL cache for example and topic anchor embeddings.
    pub anchor: Arc<EmbeddingCache>,
    /// Shared metrics handle.
    pub metrics: Arc<EmbeddingMetrics>,
    /// Circuit breaker for the embedding backend; when open, semantic paths
    /// degrade to their lexical fallbacks without issuing I/O.
    pub breaker: Option<Arc<CircuitBreaker>>,
}

impl EmbeddingStack {
    /// Payload-tier embedding, `None` when the backend is unavailable
    /// (breaker open or provider error).
    pub async fn payload_embedding(&self, text: &str) -> Option<Vec<f32>> {
        self.guarded(&self.payload, text).await
    }

    /// Anchor-tier embedding, `None` when the backend is unavailable.
    pub async fn anchor_embedding(&self, text: &str) -> Option<Vec<f32>> {
        self.guarded(&self.anchor, text).await
    }

    async fn guarded(&self, cache: &EmbeddingCache, text: &str) -> Option<Vec<f32>> {
        if let Some(breaker) = &self.breaker {
            if breaker.try_acquire().is_err() {
                return None;
            }
        }
        match cache.get(text).await {
            Ok(vector) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_success();
                }
                Some(vector)
            }
            Err(_) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_failure();
                }
                None
            }
        }
    }
}

/// Outcome of one kind-specific scoring pass, before assembly into an
/// [`EvaluationResult`].
pub(crate) struct Scored {
    /// Raw score in `[0, 1]`.
    pub raw: f64,
    /// Pre-computed effective score; `None` applies the inversion flag.
    pub effective: Option<f64>,
    /// Pre-computed decision; `None` applies the threshold comparison.
    pub decision: Option<Decision>,
    pub fallback_used: bool,
    pub skipped: bool,
    pub reason: Option<String>,
    pub error: Option<String>,
}

impl Scored {
    pub(crate) fn plain(raw: f64) -> Self {
        Self {
            raw,
            effective: None,
            decision: None,
            fallback_used: false,
            skipped: false,
            reason: None,
            error: None,
        }
    }

    pub(crate) fn skip(reason: &str) -> Self {
        Self {
            raw: 0.0,
            effective: Some(0.0),
            decision: Some(Decision::Allow),
            fallback_used: false,
            skipped: true,
            reason: Some(reason.to_owned()),
            error: None,
        }
    }
}

/// Evaluator engine: one `evaluate` entry point dispatching on guardrail
/// kind, with warm caches for compiled patterns and smart-anchor centroids.
///
/// Warm caches are keyed by config hash and written once per hash; lookups
/// after publication are lock-free map reads.
pub struct Evaluators {
    timeouts: EvaluatorTimeouts,
    embedding: Option<EmbeddingStack>,
    judge: Option<Arc<dyn JudgeClient>>,
    judge_breaker: Option<Arc<CircuitBreaker>>,
    compiled_patterns: DashMap<String, Arc<CompiledPatterns>>,
    anchors: DashMap<String, Arc<SmartAnchors>>,
}

impl Evaluators {
    /// Create an engine with no semantic or judge backends; hybrid falls
    /// back to keywords, smart runs lexical-only, kernels skip.
    pub fn new(timeouts: EvaluatorTimeouts) -> Self {
        Self {
            timeouts,
            embedding: None,
            judge: None,
            judge_breaker: None,
            compiled_patterns: DashMap::new(),
            anchors: DashMap::new(),
        }
    }

    /// Attach embedding backends for hybrid, smart, and kernel evaluators.
    pub fn with_embedding(mut self, stack: EmbeddingStack) -> Self {
        self.embedding = Some(stack);
        self
    }

    /// Attach a judge client for LLM-assisted evaluators.
    pub fn with_judge(mut self, judge: Arc<dyn JudgeClient>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Attach a circuit breaker for the judge backend; while open,
    /// LLM-assisted evaluators go straight to their keyword fallback.
    pub fn with_judge_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.judge_breaker = Some(breaker);
        self
    }

    /// Evaluate one guardrail against one payload under the given absolute
    /// deadline.
    ///
    /// An expired or exceeded deadline yields decision=block with
    /// reason=timeout; no evaluator kind fails open.
    pub async fn evaluate(
        &self,
        guardrail: &Guardrail,
        payload: &CheckPayload,
        deadline: Instant,
        phase: CheckPhase,
    ) -> EvaluationResult {
        let start = Instant::now();
        let budget = match guardrail.kind {
            // The judge call has its own internal deadline with a keyword
            // fallback; the outer budget leaves room for that fallback.
            GuardrailKind::LlmAssisted { .. } => self.timeouts.llm + self.timeouts.fast,
            _ => self.timeouts.fast,
        };
        let eval_deadline = deadline.min(start + budget);

        if eval_deadline <= start {
            return self.timeout_result(guardrail, start);
        }

        let scored = tokio::time::timeout_at(
            tokio::time::Instant::from_std(eval_deadline),
            self.score(guardrail, payload, phase),
        )
        .await;

        match scored {
            Ok(scored) => Self::assemble(guardrail, scored, start),
            Err(_) => {
                debug!(guardrail_id = %guardrail.id, "evaluator deadline exceeded");
                self.timeout_result(guardrail, start)
            }
        }
    }

    async fn score(
        &self,
        guardrail: &Guardrail,
        payload: &CheckPayload,
        phase: CheckPhase,
    ) -> Scored {
        match &guardrail.kind {
            GuardrailKind::Regex { patterns } => {
                pattern::score(&self.compiled_patterns, guardrail, patterns, payload.text())
            }
            GuardrailKind::Keyword { keywords, ceiling } => {
                Scored::plain(keyword::score(payload.text(), keywords, *ceiling))
            }
            GuardrailKind::Hybrid {
                patterns,
                topic,
                keywords,
                regex_weight,
                semantic_weight,
            } => {
                hybrid::score(
                    &self.compiled_patterns,
                    self.embedding.as_ref(),
                    guardrail,
                    patterns,
                    topic,
                    keywords,
                    *regex_weight,
                    *semantic_weight,
                    payload.text(),
                )
                .await
            }
            GuardrailKind::Smart { .. } => {
                smart::score(
                    &self.anchors,
                    self.embedding.as_ref(),
                    guardrail,
                    payload.text(),
                    phase,
                )
                .await
            }
            GuardrailKind::LlmAssisted {
                prompt_template,
                fallback_keywords,
            } => {
                llm_assisted::score(
                    self.judge.as_deref(),
                    self.judge_breaker.as_deref(),
                    self.timeouts.llm,
                    prompt_template,
                    fallback_keywords,
                    payload.text(),
                )
                .await
            }
            GuardrailKind::DlmKernel {
                safe_anchors,
                unsafe_anchors,
                sigma,
            } => {
                kernel::score(
                    self.embedding.as_ref(),
                    safe_anchors,
                    unsafe_anchors,
                    *sigma,
                    payload.text(),
                )
                .await
            }
            GuardrailKind::Composite { .. } => {
                // Composite guardrails are walked by the DAG engine; reaching
                // the scalar evaluator with one is a wiring error.
                Scored {
                    raw: 1.0,
                    effective: Some(1.0),
                    decision: Some(Decision::Block),
                    fallback_used: false,
                    skipped: false,
                    reason: Some("composite_without_dag_engine".to_owned()),
                    error: Some("composite guardrail dispatched to scalar evaluator".to_owned()),
                }
            }
        }
    }

    fn assemble(guardrail: &Guardrail, scored: Scored, start: Instant) -> EvaluationResult {
        let raw = scored.raw.clamp(0.0, 1.0);
        let effective = scored
            .effective
            .unwrap_or_else(|| guardrail.effective_score(raw))
            .clamp(0.0, 1.0);
        let decision = scored.decision.unwrap_or(if effective >= guardrail.threshold {
            Decision::Block
        } else {
            Decision::Allow
        });

        let mut metrics = HashMap::new();
        if !scored.skipped {
            metrics.insert(guardrail.metric_name.clone(), effective);
        }

        EvaluationResult {
            guardrail_id: guardrail.id.clone(),
            decision,
            raw_score: raw,
            effective_score: effective,
            metrics,
            latency_ms: elapsed_ms(start),
            evaluator: kind_tag(&guardrail.kind),
            fallback_used: scored.fallback_used,
            skipped: scored.skipped,
            reason: scored.reason,
            error: scored.error,
        }
    }

    fn timeout_result(&self, guardrail: &Guardrail, start: Instant) -> EvaluationResult {
        EvaluationResult {
            guardrail_id: guardrail.id.clone(),
            decision: Decision::Block,
            raw_score: 1.0,
            effective_score: 1.0,
            metrics: HashMap::new(),
            latency_ms: elapsed_ms(start),
            evaluator: kind_tag(&guardrail.kind),
            fallback_used: false,
            skipped: false,
            reason: Some("timeout".to_owned()),
            error: None,
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn kind_tag(kind: &GuardrailKind) -> EvaluatorKind {
    match kind {
        GuardrailKind::Regex { .. } => EvaluatorKind::Regex,
        GuardrailKind::Keyword { .. } => EvaluatorKind::Keyword,
        GuardrailKind::Hybrid { .. } => EvaluatorKind::Hybrid,
        GuardrailKind::Smart { .. } => EvaluatorKind::Smart,
        GuardrailKind::LlmAssisted { .. } => EvaluatorKind::LlmAssisted,
        GuardrailKind::DlmKernel { .. } => EvaluatorKind::DlmKernel,
        GuardrailKind::Composite { .. } => EvaluatorKind::Composite,
    }
}

impl std::fmt::Debug for Evaluators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluators")
            .field("timeouts", &self.timeouts)
            .field("embedding", &self.embedding.is_some())
            .field("judge", &self.judge.is_some())
            .field("warm_patterns", &self.compiled_patterns.len())
            .field("warm_anchors", &self.anchors.len())
            .finish()
    }
}
