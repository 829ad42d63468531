use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[cfg(feature = "utoipa")]
use utoipa::ToSchema;

use crate::dag::CompositeNode;

/// Severity attached to a violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Where a guardrail definition came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum GuardrailOrigin {
    /// Compiled into the binary.
    Static,
    /// Registered at runtime through the admin surface.
    #[default]
    Dynamic,
}

impl std::fmt::Display for GuardrailOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A regular expression with a contribution weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct WeightedPattern {
    /// Regex source, compiled once per config hash.
    pub pattern: String,
    /// Score contribution when the pattern matches.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// A keyword with a contribution weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct WeightedKeyword {
    /// Lowercase token matched against the tokenized payload.
    pub keyword: String,
    /// Score contribution per occurrence.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Type-specific evaluator configuration.
///
/// Serialized with a `type` discriminator so registration bodies carry the
/// variant fields at the top level next to the common header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardrailKind {
    /// Weighted regex match. Score = clamp(sum of matching weights, 0, 1).
    Regex {
        patterns: Vec<WeightedPattern>,
    },
    /// Weighted keyword count normalized by a ceiling.
    Keyword {
        keywords: Vec<WeightedKeyword>,
        #[serde(default = "default_ceiling")]
        ceiling: f64,
    },
    /// Weighted fusion of a regex score and a semantic-similarity score
    /// against an anchor topic. The semantic half falls back to the keyword
    /// list when the embedding backend is unavailable.
    Hybrid {
        patterns: Vec<WeightedPattern>,
        topic: String,
        #[serde(default)]
        keywords: Vec<WeightedKeyword>,
        #[serde(default = "default_regex_weight")]
        regex_weight: f64,
        #[serde(default = "default_semantic_weight")]
        semantic_weight: f64,
    },
    /// Embedding-plus-lexical classifier with a three-zone decision.
    Smart {
        safe_examples: Vec<String>,
        unsafe_examples: Vec<String>,
        #[serde(default)]
        lexical_keywords: Vec<WeightedKeyword>,
        #[serde(default = "default_t_allow")]
        t_allow: f64,
        #[serde(default = "default_t_block")]
        t_block: f64,
        #[serde(default = "default_embedding_weight")]
        embedding_weight: f64,
        #[serde(default = "default_lexical_weight")]
        lexical_weight: f64,
        /// Overrides the phase-dependent treatment of the review zone.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        review_blocks: Option<bool>,
    },
    /// External judge model with a prompt-injection pre-filter and keyword
    /// fallback on timeout or malformed output.
    LlmAssisted {
        prompt_template: String,
        #[serde(default)]
        fallback_keywords: Vec<WeightedKeyword>,
    },
    /// Multi-anchor RBF kernel over calibrated embedding anchors.
    DlmKernel {
        #[serde(default)]
        safe_anchors: Vec<Vec<f32>>,
        #[serde(default)]
        unsafe_anchors: Vec<Vec<f32>>,
        #[serde(default = "default_sigma")]
        sigma: f64,
    },
    /// AND/OR/NOT composition over other guardrails.
    Composite {
        dag: CompositeNode,
    },
}

fn default_ceiling() -> f64 {
    10.0
}
fn default_regex_weight() -> f64 {
    0.4
}
fn default_semantic_weight() -> f64 {
    0.6
}
fn default_t_allow() -> f64 {
    0.35
}
fn default_t_block() -> f64 {
    0.65
}
fn default_embedding_weight() -> f64 {
    0.6
}
fn default_lexical_weight() -> f64 {
    0.4
}
fn default_sigma() -> f64 {
    1.0
}

impl GuardrailKind {
    /// Short type tag matching the serialized `type` discriminator.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Regex { .. } => "regex",
            Self::Keyword { .. } => "keyword",
            Self::Hybrid { .. } => "hybrid",
            Self::Smart { .. } => "smart",
            Self::LlmAssisted { .. } => "llm_assisted",
            Self::DlmKernel { .. } => "dlm_kernel",
            Self::Composite { .. } => "composite",
        }
    }
}

/// One policy check: a named evaluator configuration producing a metric value
/// and a decision. Immutable for a given id; replacement swaps the whole
/// entry atomically in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct Guardrail {
    /// Guardrail identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the guardrail checks for.
    #[serde(default)]
    pub description: String,
    /// Name of the metric this guardrail emits.
    pub metric_name: String,
    /// Block threshold applied to the effective score.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// When set, effective score = 1 - raw score.
    #[serde(default)]
    pub invert_score: bool,
    /// Severity attached to violations of this guardrail.
    #[serde(default)]
    pub severity: Severity,
    /// Evaluator-specific configuration.
    #[serde(flatten)]
    #[cfg_attr(feature = "utoipa", schema(value_type = Object))]
    pub kind: GuardrailKind,
    /// Provenance; assigned by the registry, not the registration body.
    #[serde(default)]
    pub origin: GuardrailOrigin,
}

fn default_threshold() -> f64 {
    0.5
}

impl Guardrail {
    /// Effective score after applying the inversion flag.
    pub fn effective_score(&self, raw: f64) -> f64 {
        if self.invert_score { 1.0 - raw } else { raw }
    }

    /// Threshold comparison: effective score at or above the threshold blocks.
    pub fn breaches(&self, raw: f64) -> bool {
        self.effective_score(raw) >= self.threshold
    }

    /// Stable hash of the evaluator configuration, used to key warm caches
    /// (compiled patterns, precomputed centroids). Two guardrails with
    /// identical configs share compiled state.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(b"\0");
        // Serialization of GuardrailKind is deterministic: struct variants
        // serialize fields in declaration order.
        if let Ok(bytes) = serde_json::to_vec(&self.kind) {
            hasher.update(&bytes);
        }
        hex::encode(&hasher.finalize()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regex_guardrail(invert: bool) -> Guardrail {
        Guardrail {
            id: "pii_blocker".into(),
            name: "PII blocker".into(),
            description: String::new(),
            metric_name: "pii_risk".into(),
            threshold: 0.5,
            invert_score: invert,
            severity: Severity::High,
            kind: GuardrailKind::Regex {
                patterns: vec![WeightedPattern {
                    pattern: r"\b\d{3}-\d{2}-\d{4}\b".into(),
                    weight: 0.8,
                }],
            },
            origin: GuardrailOrigin::Static,
        }
    }

    #[test]
    fn effective_score_inversion() {
        let g = regex_guardrail(false);
        assert!((g.effective_score(0.8) - 0.8).abs() < f64::EPSILON);

        let g = regex_guardrail(true);
        assert!((g.effective_score(0.8) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn breaches_at_threshold() {
        let g = regex_guardrail(false);
        assert!(g.breaches(0.5));
        assert!(g.breaches(0.9));
        assert!(!g.breaches(0.49));
    }

    #[test]
    fn inversion_flips_decision_off_threshold() {
        let g = regex_guardrail(false);
        let inverted = regex_guardrail(true);
        for raw in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            if (g.effective_score(raw) - g.threshold).abs() > 1e-9 {
                assert_ne!(g.breaches(raw), inverted.breaches(raw), "raw={raw}");
            }
        }
    }

    #[test]
    fn registration_body_deserializes() {
        let body = serde_json::json!({
            "id": "smoking_compliance_checker",
            "name": "Smoking compliance",
            "metric_name": "smoking_compliance",
            "threshold": 0.7,
            "type": "llm_assisted",
            "prompt_template": "Does the text promote tobacco products?",
            "fallback_keywords": [{"keyword": "cigarette", "weight": 0.5}],
        });
        let g: Guardrail = serde_json::from_value(body).unwrap();
        assert_eq!(g.kind.type_tag(), "llm_assisted");
        assert_eq!(g.origin, GuardrailOrigin::Dynamic);
        match g.kind {
            GuardrailKind::LlmAssisted {
                fallback_keywords, ..
            } => assert_eq!(fallback_keywords.len(), 1),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn smart_defaults_applied() {
        let body = serde_json::json!({
            "id": "s",
            "name": "s",
            "metric_name": "m",
            "type": "smart",
            "safe_examples": ["hello"],
            "unsafe_examples": ["attack"],
        });
        let g: Guardrail = serde_json::from_value(body).unwrap();
        match g.kind {
            GuardrailKind::Smart {
                t_allow,
                t_block,
                embedding_weight,
                lexical_weight,
                review_blocks,
                ..
            } => {
                assert!(t_allow < t_block);
                assert!((embedding_weight - 0.6).abs() < 1e-9);
                assert!((lexical_weight - 0.4).abs() < 1e-9);
                assert!(review_blocks.is_none());
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn config_hash_stable_and_distinct() {
        let a = regex_guardrail(false);
        let b = regex_guardrail(false);
        assert_eq!(a.config_hash(), b.config_hash());

        let mut c = regex_guardrail(false);
        c.kind = GuardrailKind::Keyword {
            keywords: vec![],
            ceiling: 10.0,
        };
        assert_ne!(a.config_hash(), c.config_hash());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }
}
