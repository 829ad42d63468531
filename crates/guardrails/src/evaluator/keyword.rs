use std::collections::HashMap;

use warden_core::WeightedKeyword;

/// Lowercase and split on non-alphanumeric boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Weighted keyword score: sum of `weight * occurrence_count` normalized by
/// `ceiling` and clamped to `[0, 1]`.
pub(crate) fn score(text: &str, keywords: &[WeightedKeyword], ceiling: f64) -> f64 {
    if keywords.is_empty() || ceiling <= 0.0 {
        return 0.0;
    }

    let mut counts: HashMap<&str, u32> = HashMap::new();
    let tokens = tokenize(text);
    for token in &tokens {
        *counts.entry(token.as_str()).or_default() += 1;
    }

    let mut total = 0.0;
    for kw in keywords {
        if let Some(count) = counts.get(kw.keyword.to_lowercase().as_str()) {
            total += kw.weight * f64::from(*count);
        }
    }

    (total / ceiling).clamp(0.0, 1.0)
}

/// Presence-style score used by fallback paths: sum of weights of keywords
/// appearing at least once, clamped to `[0, 1]`.
pub(crate) fn presence_score(text: &str, keywords: &[WeightedKeyword]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let tokens = tokenize(text);
    let mut total = 0.0;
    for kw in keywords {
        let needle = kw.keyword.to_lowercase();
        if tokens.iter().any(|token| *token == needle) {
            total += kw.weight;
        }
    }
    total.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(keyword: &str, weight: f64) -> WeightedKeyword {
        WeightedKeyword {
            keyword: keyword.into(),
            weight,
        }
    }

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Hello, World! It's 42."),
            vec!["hello", "world", "it", "s", "42"]
        );
        assert!(tokenize("").is_empty());
        assert!(tokenize("---").is_empty());
    }

    #[test]
    fn counts_occurrences_against_ceiling() {
        let keywords = vec![kw("hate", 2.0), kw("kill", 3.0)];
        // "hate" twice, "kill" once: 2*2 + 3*1 = 7, ceiling 10 -> 0.7.
        let s = score("I hate hate this, do not kill it", &keywords, 10.0);
        assert!((s - 0.7).abs() < 1e-9);
    }

    #[test]
    fn score_clamps_at_one() {
        let keywords = vec![kw("bad", 10.0)];
        assert!((score("bad bad bad", &keywords, 5.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn matching_is_case_insensitive_and_word_bounded() {
        let keywords = vec![kw("Die", 1.0)];
        assert!(score("DIE die", &keywords, 2.0) > 0.9);
        // "diet" must not match "die".
        assert!((score("diet plan", &keywords, 2.0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(score("anything", &[], 10.0), 0.0);
        assert_eq!(score("", &[kw("x", 1.0)], 10.0), 0.0);
        assert_eq!(score("x", &[kw("x", 1.0)], 0.0), 0.0);
    }

    #[test]
    fn presence_ignores_repetition() {
        let keywords = vec![kw("cigarette", 0.5), kw("tobacco", 0.5)];
        let once = presence_score("buy a cigarette", &keywords);
        let many = presence_score("cigarette cigarette cigarette", &keywords);
        assert!((once - 0.5).abs() < 1e-9);
        assert!((many - 0.5).abs() < 1e-9);
        assert!((presence_score("cigarette and tobacco", &keywords) - 1.0).abs() < 1e-9);
    }
}
