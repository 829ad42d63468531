use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::judge::{Judgement, JudgeClient};

/// Instruction appended to every policy prompt so the judge answers in the
/// structured shape the gateway parses.
const RESPONSE_FORMAT_INSTRUCTION: &str = "Respond with only a JSON object of the form \
{\"violates_policy\": <bool>, \"confidence\": <number between 0 and 1>}.";

/// HTTP judge client using an OpenAI-compatible chat completions API.
#[derive(Debug)]
pub struct HttpJudge {
    client: reqwest::Client,
    config: JudgeConfig,
}

impl HttpJudge {
    /// Create a new HTTP judge with the given configuration.
    pub fn new(config: JudgeConfig) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| JudgeError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Parse the judge's reply, stripping markdown code fences if present.
    fn parse_judgement(content: &str) -> Result<Judgement, JudgeError> {
        let trimmed = content.trim();

        let json_str = if trimmed.starts_with("```") {
            let without_opening = if let Some(rest) = trimmed.strip_prefix("```json") {
                rest
            } else {
                trimmed.strip_prefix("```").unwrap_or(trimmed)
            };
            without_opening
                .strip_suffix("```")
                .unwrap_or(without_opening)
                .trim()
        } else {
            trimmed
        };

        let judgement: Judgement = serde_json::from_str(json_str).map_err(|e| {
            JudgeError::ParseError(format!("judge reply is not a structured judgement: {e}"))
        })?;

        if !(0.0..=1.0).contains(&judgement.confidence) {
            return Err(JudgeError::ParseError(format!(
                "confidence {} outside [0, 1]",
                judgement.confidence
            )));
        }
        Ok(judgement)
    }
}

#[async_trait]
impl JudgeClient for HttpJudge {
    async fn judge(&self, policy_prompt: &str, payload: &str) -> Result<Judgement, JudgeError> {
        let system = format!("{policy_prompt}\n\n{RESPONSE_FORMAT_INSTRUCTION}");

        let request_body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": payload},
            ]
        });

        debug!(endpoint = %self.config.endpoint, model = %self.config.model, "dispatching judge request");

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeError::Timeout(self.config.timeout_seconds)
                } else {
                    JudgeError::HttpError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "judge API returned error");
            return Err(JudgeError::ApiError(format!("HTTP {status}: {body}")));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| JudgeError::ParseError(format!("failed to parse API response: {e}")))?;

        let content = response_json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                JudgeError::ParseError(format!("unexpected response format: {response_json}"))
            })?;

        Self::parse_judgement(content)
    }
}
