use std::time::Duration;

use tracing::{debug, warn};

use warden_core::{CircuitBreaker, Decision, WeightedKeyword};
use warden_llm::{JudgeClient, JudgeError};

use super::{Scored, keyword};
use crate::injection::detect_prompt_injection;

/// LLM-assisted scoring: prompt-injection pre-filter, external judge
/// dispatch, strict parse, keyword fallback.
///
/// The pre-filter runs before anything leaves the process; a triggered
/// marker short-circuits to block with score 1.0 and no external call.
/// Timeouts, malformed judge output, and an open judge circuit all fall back
/// to the keyword branch.
pub(crate) async fn score(
    judge: Option<&dyn JudgeClient>,
    breaker: Option<&CircuitBreaker>,
    judge_timeout: Duration,
    prompt_template: &str,
    fallback_keywords: &[WeightedKeyword],
    text: &str,
) -> Scored {
    if let Some(marker) = detect_prompt_injection(text) {
        debug!(marker, "prompt-injection pre-filter triggered, skipping judge dispatch");
        return Scored {
            raw: 1.0,
            effective: Some(1.0),
            decision: Some(Decision::Block),
            fallback_used: false,
            skipped: false,
            reason: Some("prompt_injection_detected".to_owned()),
            error: None,
        };
    }

    let Some(judge) = judge else {
        return fallback(fallback_keywords, text, "judge_unconfigured", None);
    };

    if let Some(breaker) = breaker {
        if breaker.try_acquire().is_err() {
            return fallback(fallback_keywords, text, "judge_unavailable", None);
        }
    }

    let verdict = tokio::time::timeout(judge_timeout, judge.judge(prompt_template, text)).await;

    match verdict {
        Ok(Ok(judgement)) => {
            if let Some(breaker) = breaker {
                breaker.record_success();
            }
            let raw = if judgement.violates_policy {
                judgement.confidence
            } else {
                1.0 - judgement.confidence
            };
            Scored::plain(raw.clamp(0.0, 1.0))
        }
        Ok(Err(JudgeError::ParseError(detail))) => {
            // Malformed output is the judge answering, just badly; it does
            // not count against the circuit.
            if let Some(breaker) = breaker {
                breaker.record_success();
            }
            warn!(error = %detail, "judge returned malformed output, using keyword fallback");
            fallback(fallback_keywords, text, "judge_malformed", Some(detail))
        }
        Ok(Err(JudgeError::Timeout(_))) | Err(_) => {
            if let Some(breaker) = breaker {
                breaker.record_failure();
            }
            warn!("judge timed out, using keyword fallback");
            fallback(fallback_keywords, text, "judge_timeout", None)
        }
        Ok(Err(other)) => {
            if let Some(breaker) = breaker {
                breaker.record_failure();
            }
            warn!(error = %other, "judge call failed, using keyword fallback");
            fallback(fallback_keywords, text, "judge_error", Some(other.to_string()))
        }
    }
}

fn fallback(
    keywords: &[WeightedKeyword],
    text: &str,
    reason: &str,
    error: Option<String>,
) -> Scored {
    Scored {
        raw: keyword::presence_score(text, keywords),
        effective: None,
        decision: None,
        fallback_used: true,
        skipped: false,
        reason: Some(reason.to_owned()),
        error,
    }
}
