use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::JudgeError;
use crate::judge::{Judgement, JudgeClient};

/// A judge that always returns the same verdict, counting calls so tests can
/// assert whether the external dispatch happened at all.
#[derive(Debug)]
pub struct StaticJudge {
    violates_policy: bool,
    confidence: f64,
    calls: AtomicUsize,
}

impl StaticJudge {
    /// Create a judge with a fixed verdict.
    pub fn new(violates_policy: bool, confidence: f64) -> Self {
        Self {
            violates_policy,
            confidence,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of judge calls dispatched.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl JudgeClient for StaticJudge {
    async fn judge(&self, _policy_prompt: &str, _payload: &str) -> Result<Judgement, JudgeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(Judgement {
            violates_policy: self.violates_policy,
            confidence: self.confidence,
        })
    }
}

/// A judge that always fails with the given error kind, for exercising the
/// keyword fallback path.
#[derive(Debug)]
pub struct FailingJudge {
    timeout: bool,
}

impl FailingJudge {
    /// Fail with an API error.
    pub fn api_error() -> Self {
        Self { timeout: false }
    }

    /// Fail with a timeout.
    pub fn timeout() -> Self {
        Self { timeout: true }
    }
}

#[async_trait]
impl JudgeClient for FailingJudge {
    async fn judge(&self, _policy_prompt: &str, _payload: &str) -> Result<Judgement, JudgeError> {
        if self.timeout {
            Err(JudgeError::Timeout(5))
        } else {
            Err(JudgeError::ApiError("mock failure".to_owned()))
        }
    }
}
