use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::JudgeError;

/// Structured verdict from the external judge model.
///
/// Parsing is strict: both fields must be present with the right types, or
/// the caller treats the output as malformed and falls back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Judgement {
    /// Whether the payload violates the policy in the prompt.
    pub violates_policy: bool,
    /// Judge confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Trait for dispatching a policy question about a payload to a judge model.
#[async_trait]
pub trait JudgeClient: Send + Sync + std::fmt::Debug {
    /// Ask the judge whether `payload` violates the policy described by
    /// `policy_prompt`.
    async fn judge(&self, policy_prompt: &str, payload: &str) -> Result<Judgement, JudgeError>;
}
