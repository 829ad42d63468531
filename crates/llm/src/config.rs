use serde::{Deserialize, Serialize};

/// Configuration for the HTTP judge client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Chat-completions endpoint of the judge model.
    pub endpoint: String,
    /// Model identifier.
    pub model: String,
    /// Bearer token.
    #[serde(default)]
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Sampling temperature; zero for deterministic judgements.
    #[serde(default)]
    pub temperature: f64,
    /// Completion token budget.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_seconds() -> u64 {
    5
}

fn default_max_tokens() -> u32 {
    128
}

impl JudgeConfig {
    /// Create a config with default timeout, temperature, and token budget.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout_seconds: default_timeout_seconds(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the completion token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}
