use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use tracing::warn;

use warden_core::{Guardrail, WeightedPattern};

use super::Scored;

/// Patterns compiled once per config hash.
///
/// Published to the warm cache after compilation and immutable afterwards;
/// readers share the `Arc` without locking.
pub(crate) struct CompiledPatterns {
    patterns: Vec<(Regex, f64)>,
}

impl CompiledPatterns {
    /// Compile a pattern list, dropping (with a warning) any entry that fails
    /// to compile. Registration validates patterns, so drops only happen for
    /// guardrails that bypassed the registry.
    fn compile(source: &[WeightedPattern]) -> Self {
        let mut patterns = Vec::with_capacity(source.len());
        for wp in source {
            match Regex::new(&wp.pattern) {
                Ok(regex) => patterns.push((regex, wp.weight)),
                Err(e) => {
                    warn!(pattern = %wp.pattern, error = %e, "dropping uncompilable pattern");
                }
            }
        }
        Self { patterns }
    }

    /// Sum of weights of matching patterns, clamped to `[0, 1]`.
    pub(crate) fn score(&self, text: &str) -> f64 {
        let mut total = 0.0;
        for (regex, weight) in &self.patterns {
            if regex.is_match(text) {
                total += weight;
            }
        }
        total.clamp(0.0, 1.0)
    }
}

/// Fetch (or compile and publish) the compiled patterns for a guardrail.
pub(crate) fn compiled(
    cache: &DashMap<String, Arc<CompiledPatterns>>,
    guardrail: &Guardrail,
    source: &[WeightedPattern],
) -> Arc<CompiledPatterns> {
    let key = guardrail.config_hash();
    if let Some(existing) = cache.get(&key) {
        return Arc::clone(existing.value());
    }
    let compiled = Arc::new(CompiledPatterns::compile(source));
    cache.entry(key).or_insert(compiled).value().clone()
}

/// Score a regex guardrail.
pub(crate) fn score(
    cache: &DashMap<String, Arc<CompiledPatterns>>,
    guardrail: &Guardrail,
    source: &[WeightedPattern],
    text: &str,
) -> Scored {
    Scored::plain(compiled(cache, guardrail, source).score(text))
}
