use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use warden_core::{CheckPhase, Decision, Guardrail, GuardrailKind};
use warden_embedding::{centroid, cosine_similarity, normalize};

use super::{EmbeddingStack, Scored, keyword};

/// Safe/unsafe example centroids, computed once per config hash on first use
/// and shared by all subsequent evaluations.
pub(crate) struct SmartAnchors {
    safe: Vec<f32>,
    risky: Vec<f32>,
}

/// Smart scoring: embedding distance to safe/unsafe centroids fused with a
/// lexical keyword score, then a three-zone decision.
///
/// Zones: `score < t_allow` allows, `score > t_block` blocks, and the review
/// zone in between blocks on the request phase and allows on the response
/// phase unless the guardrail overrides it with `review_blocks`.
pub(crate) async fn score(
    anchors_cache: &DashMap<String, Arc<SmartAnchors>>,
    embedding: Option<&EmbeddingStack>,
    guardrail: &Guardrail,
    text: &str,
    phase: CheckPhase,
) -> Scored {
    let GuardrailKind::Smart {
        safe_examples,
        unsafe_examples,
        lexical_keywords,
        t_allow,
        t_block,
        embedding_weight,
        lexical_weight,
        review_blocks,
    } = &guardrail.kind
    else {
        return Scored::skip("not_a_smart_guardrail");
    };

    let lexical = if lexical_keywords.is_empty() {
        None
    } else {
        Some(keyword::presence_score(text, lexical_keywords))
    };

    let embedded = embed_score(
        anchors_cache,
        embedding,
        guardrail,
        safe_examples,
        unsafe_examples,
        text,
    )
    .await;

    let (raw, fallback_used, reason) = match (embedded, lexical) {
        (Some(e), Some(l)) => {
            let total = embedding_weight + lexical_weight;
            let fused = if total > 0.0 {
                (embedding_weight * e + lexical_weight * l) / total
            } else {
                e.max(l)
            };
            (fused, false, None)
        }
        (Some(e), None) => (e, false, None),
        (None, Some(l)) => {
            if let Some(stack) = embedding {
                stack.metrics.record_lexical_fallback();
            }
            debug!(guardrail_id = %guardrail.id, "smart evaluator degraded to lexical-only");
            (l, true, Some("embedding_unavailable".to_owned()))
        }
        (None, None) => return Scored::skip("embedding_unavailable"),
    };

    let effective = guardrail.effective_score(raw).clamp(0.0, 1.0);

    let (decision, zone_reason) = if effective < *t_allow {
        (Decision::Allow, None)
    } else if effective > *t_block {
        (Decision::Block, None)
    } else {
        let blocks = review_blocks.unwrap_or(phase.is_request());
        (
            if blocks { Decision::Block } else { Decision::Allow },
            Some("review_zone".to_owned()),
        )
    };

    Scored {
        raw,
        effective: Some(effective),
        decision: Some(decision),
        fallback_used,
        skipped: false,
        reason: zone_reason.or(reason),
        error: None,
    }
}

/// `(cos(e, C_unsafe) - cos(e, C_safe) + 1) / 2`, or `None` when the
/// embedding backend is missing or failing.
async fn embed_score(
    anchors_cache: &DashMap<String, Arc<SmartAnchors>>,
    embedding: Option<&EmbeddingStack>,
    guardrail: &Guardrail,
    safe_examples: &[String],
    unsafe_examples: &[String],
    text: &str,
) -> Option<f64> {
    let stack = embedding?;
    let anchors = anchors_for(anchors_cache, stack, guardrail, safe_examples, unsafe_examples).await?;

    let mut payload = stack.payload_embedding(text).await?;
    normalize(&mut payload);

    let cos_unsafe = cosine_similarity(&payload, &anchors.risky);
    let cos_safe = cosine_similarity(&payload, &anchors.safe);
    Some((f64::from(cos_unsafe - cos_safe) + 1.0) / 2.0)
}

/// Fetch (or compute and publish) the centroids for a guardrail's examples.
async fn anchors_for(
    anchors_cache: &DashMap<String, Arc<SmartAnchors>>,
    stack: &EmbeddingStack,
    guardrail: &Guardrail,
    safe_examples: &[String],
    unsafe_examples: &[String],
) -> Option<Arc<SmartAnchors>> {
    let key = guardrail.config_hash();
    if let Some(existing) = anchors_cache.get(&key) {
        return Some(Arc::clone(existing.value()));
    }

    let safe = centroid(&embed_all(stack, safe_examples).await?)?;
    let risky = centroid(&embed_all(stack, unsafe_examples).await?)?;
    let anchors = Arc::new(SmartAnchors { safe, risky });

    Some(anchors_cache.entry(key).or_insert(anchors).value().clone())
}

async fn embed_all(stack: &EmbeddingStack, texts: &[String]) -> Option<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for text in texts {
        vectors.push(stack.anchor_embedding(text).await?);
    }
    Some(vectors)
}
