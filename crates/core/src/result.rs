use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[cfg(feature = "utoipa")]
use utoipa::ToSchema;

use crate::context::CheckPhase;
use crate::guardrail::Severity;

/// Terminal decision for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// Decision of a composite node, where every calibrated leaf may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DagDecision {
    Allow,
    Block,
    /// Every leaf under the node was skipped (e.g. uncalibrated kernels).
    Skip,
}

impl DagDecision {
    /// Collapse to a terminal decision; a fully-skipped tree enforces nothing.
    pub fn unwrap_or_allow(self) -> Decision {
        match self {
            Self::Block => Decision::Block,
            Self::Allow | Self::Skip => Decision::Allow,
        }
    }
}

/// Evaluator kind tag carried on every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    Regex,
    Keyword,
    Hybrid,
    Smart,
    LlmAssisted,
    DlmKernel,
    Composite,
}

impl std::fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regex => write!(f, "regex"),
            Self::Keyword => write!(f, "keyword"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::Smart => write!(f, "smart"),
            Self::LlmAssisted => write!(f, "llm_assisted"),
            Self::DlmKernel => write!(f, "dlm_kernel"),
            Self::Composite => write!(f, "composite"),
        }
    }
}

/// Outcome of evaluating one guardrail against one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct EvaluationResult {
    /// Which guardrail produced this result.
    pub guardrail_id: String,
    /// Decision after threshold comparison (allow for skipped leaves).
    pub decision: Decision,
    /// Raw score in `[0, 1]` before inversion.
    pub raw_score: f64,
    /// Score after the inversion flag, compared against the threshold.
    pub effective_score: f64,
    /// Metric name/value pairs extracted during evaluation, reused by the
    /// envelope checker.
    pub metrics: HashMap<String, f64>,
    /// Wall-clock evaluation latency in milliseconds.
    pub latency_ms: u64,
    /// Evaluator kind.
    pub evaluator: EvaluatorKind,
    /// Whether a degraded path (e.g. keyword fallback) produced the score.
    #[serde(default)]
    pub fallback_used: bool,
    /// True when the evaluator could not run (e.g. uncalibrated kernel); the
    /// composite engine treats skipped leaves as its operator identity.
    #[serde(default)]
    pub skipped: bool,
    /// Short machine-readable reason (`timeout`,
    /// `prompt_injection_detected`, `not_calibrated`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Evaluation error detail, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    /// A skipped result (leaf could not be evaluated and must not block).
    pub fn skipped(guardrail_id: &str, evaluator: EvaluatorKind, reason: &str) -> Self {
        Self {
            guardrail_id: guardrail_id.to_owned(),
            decision: Decision::Allow,
            raw_score: 0.0,
            effective_score: 0.0,
            metrics: HashMap::new(),
            latency_ms: 0,
            evaluator,
            fallback_used: false,
            skipped: true,
            reason: Some(reason.to_owned()),
            error: None,
        }
    }
}

/// A single policy violation surfaced to the caller and telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct Violation {
    /// Metric the violation concerns.
    pub metric: String,
    /// Observed value.
    pub value: f64,
    /// Lower bound, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Severity of the violation.
    pub severity: Severity,
    /// Which payload the violation was found in.
    pub phase: CheckPhase,
    /// Optional short human-readable detail. Never contains payload content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregated outcome of a composite tree walk.
#[derive(Debug, Clone)]
pub struct DagOutcome {
    /// Node decision with skip propagation.
    pub decision: DagDecision,
    /// Aggregated score (AND=max, OR=min, NOT=1-child).
    pub score: f64,
    /// Results of every leaf actually evaluated, in evaluation order.
    /// Short-circuited leaves are absent.
    pub results: Vec<EvaluationResult>,
}

impl DagOutcome {
    /// Merge every leaf's extracted metrics into one map. Later evaluations
    /// of the same metric overwrite earlier ones.
    pub fn merged_metrics(&self) -> HashMap<String, f64> {
        let mut merged = HashMap::new();
        for result in &self.results {
            for (name, value) in &result.metrics {
                merged.insert(name.clone(), *value);
            }
        }
        merged
    }
}
