use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use warden_core::{Guardrail, WeightedKeyword, WeightedPattern};
use warden_embedding::cosine_similarity;

use super::pattern::{self, CompiledPatterns};
use super::{EmbeddingStack, Scored, keyword};

/// Hybrid scoring: weighted fusion of a regex score and a semantic-similarity
/// score against the guardrail's topic anchor.
///
/// When no embedding backend is configured or the backend errors, the
/// semantic half degrades to the keyword list and the result is marked
/// `fallback_used`.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn score(
    patterns_cache: &DashMap<String, Arc<CompiledPatterns>>,
    embedding: Option<&EmbeddingStack>,
    guardrail: &Guardrail,
    patterns: &[WeightedPattern],
    topic: &str,
    keywords: &[WeightedKeyword],
    regex_weight: f64,
    semantic_weight: f64,
    text: &str,
) -> Scored {
    let regex_score = pattern::compiled(patterns_cache, guardrail, patterns).score(text);

    let (semantic_score, fallback_used, reason) = match semantic_similarity(embedding, topic, text).await {
        Some(similarity) => (similarity, false, None),
        None => {
            if let Some(stack) = embedding {
                stack.metrics.record_lexical_fallback();
            }
            debug!(guardrail_id = %guardrail.id, "semantic half unavailable, using keyword fallback");
            (
                keyword::presence_score(text, keywords),
                true,
                Some("embedding_unavailable".to_owned()),
            )
        }
    };

    let total_weight = regex_weight + semantic_weight;
    let raw = if total_weight > 0.0 {
        (regex_weight * regex_score + semantic_weight * semantic_score) / total_weight
    } else {
        regex_score.max(semantic_score)
    };

    Scored {
        fallback_used,
        reason,
        ..Scored::plain(raw)
    }
}

/// Cosine similarity between payload and topic anchor, mapped to `[0, 1]`.
/// `None` when the backend is missing, failing, or circuit-open.
async fn semantic_similarity(
    embedding: Option<&EmbeddingStack>,
    topic: &str,
    text: &str,
) -> Option<f64> {
    let stack = embedding?;
    let anchor = stack.anchor_embedding(topic).await?;
    let payload = stack.payload_embedding(text).await?;
    let cos = cosine_similarity(&payload, &anchor);
    Some((f64::from(cos) + 1.0) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use warden_core::{GuardrailKind, GuardrailOrigin, Severity};
    use warden_embedding::{
        CacheTier, EmbeddingCache, EmbeddingMetrics, FailingEmbeddingProvider,
        MappingEmbeddingProvider,
    };

    fn guardrail() -> Guardrail {
        Guardrail {
            id: "h".into(),
            name: "h".into(),
            description: String::new(),
            metric_name: "m".into(),
            threshold: 0.5,
            invert_score: false,
            severity: Severity::Medium,
            kind: GuardrailKind::Hybrid {
                patterns: vec![],
                topic: "violence".into(),
                keywords: vec![],
                regex_weight: 0.4,
                semantic_weight: 0.6,
            },
            origin: GuardrailOrigin::Static,
        }
    }

    fn stack_with(mappings: HashMap<String, Vec<f32>>) -> EmbeddingStack {
        let provider = Arc::new(MappingEmbeddingProvider::new(mappings, 2));
        let metrics = Arc::new(EmbeddingMetrics::default());
        EmbeddingStack {
            payload: Arc::new(EmbeddingCache::new(
                Arc::clone(&provider) as _,
                64,
                Duration::from_secs(60),
                Arc::clone(&metrics),
                CacheTier::Payload,
            )),
            anchor: Arc::new(EmbeddingCache::new(
                provider,
                64,
                Duration::from_secs(600),
                Arc::clone(&metrics),
                CacheTier::Anchor,
            )),
            metrics,
            breaker: None,
        }
    }

    fn failing_stack() -> EmbeddingStack {
        let provider = Arc::new(FailingEmbeddingProvider);
        let metrics = Arc::new(EmbeddingMetrics::default());
        EmbeddingStack {
            payload: Arc::new(EmbeddingCache::new(
                Arc::clone(&provider) as _,
                64,
                Duration::from_secs(60),
                Arc::clone(&metrics),
                CacheTier::Payload,
            )),
            anchor: Arc::new(EmbeddingCache::new(
                provider,
                64,
                Duration::from_secs(600),
                Arc::clone(&metrics),
                CacheTier::Anchor,
            )),
            metrics,
            breaker: None,
        }
    }

    fn kw(keyword: &str, weight: f64) -> WeightedKeyword {
        WeightedKeyword {
            keyword: keyword.into(),
            weight,
        }
    }

    fn wp(pattern_src: &str, weight: f64) -> WeightedPattern {
        WeightedPattern {
            pattern: pattern_src.into(),
            weight,
        }
    }

    #[tokio::test]
    async fn fuses_regex_and_semantic_scores() {
        let mut mappings = HashMap::new();
        mappings.insert("violence".to_owned(), vec![1.0, 0.0]);
        mappings.insert("fight fight fight".to_owned(), vec![1.0, 0.0]);
        let stack = stack_with(mappings);
        let cache = DashMap::new();
        let patterns = vec![wp(r"\bfight\b", 1.0)];

        let scored = score(
            &cache,
            Some(&stack),
            &guardrail(),
            &patterns,
            "violence",
            &[],
            0.4,
            0.6,
            "fight fight fight",
        )
        .await;

        // regex 1.0, semantic (cos=1 -> 1.0): fused = 1.0.
        assert!((scored.raw - 1.0).abs() < 1e-6);
        assert!(!scored.fallback_used);
    }

    #[tokio::test]
    async fn unrelated_payload_scores_low() {
        let mut mappings = HashMap::new();
        mappings.insert("violence".to_owned(), vec![1.0, 0.0]);
        mappings.insert("gardening tips".to_owned(), vec![-1.0, 0.0]);
        let stack = stack_with(mappings);
        let cache = DashMap::new();

        let scored = score(
            &cache,
            Some(&stack),
            &guardrail(),
            &[],
            "violence",
            &[],
            0.4,
            0.6,
            "gardening tips",
        )
        .await;

        // regex 0.0, semantic (cos=-1 -> 0.0): fused = 0.0.
        assert!(scored.raw < 1e-6);
    }

    #[tokio::test]
    async fn falls_back_to_keywords_without_backend() {
        let cache = DashMap::new();
        let keywords = vec![kw("fight", 1.0)];

        let scored = score(
            &cache,
            None,
            &guardrail(),
            &[],
            "violence",
            &keywords,
            0.4,
            0.6,
            "a big fight",
        )
        .await;

        assert!(scored.fallback_used);
        assert_eq!(scored.reason.as_deref(), Some("embedding_unavailable"));
        // regex 0.0 * 0.4 + keyword 1.0 * 0.6 = 0.6.
        assert!((scored.raw - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn falls_back_to_keywords_on_backend_error() {
        let stack = failing_stack();
        let cache = DashMap::new();
        let keywords = vec![kw("fight", 1.0)];

        let scored = score(
            &cache,
            Some(&stack),
            &guardrail(),
            &[],
            "violence",
            &keywords,
            0.4,
            0.6,
            "a big fight",
        )
        .await;

        assert!(scored.fallback_used);
        assert_eq!(stack.metrics.snapshot().lexical_fallbacks, 1);
    }
}
