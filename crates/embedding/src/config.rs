use serde::{Deserialize, Serialize};

/// Configuration for the HTTP embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Full URL of the embeddings endpoint.
    pub endpoint: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Bearer token for the provider.
    #[serde(default)]
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl EmbeddingConfig {
    /// Create a config with default timeout.
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
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EmbeddingConfig::new("http://localhost/v1/embeddings", "small-embed", "key");
        assert_eq!(cfg.timeout_seconds, 10);
    }

    #[test]
    fn builder_overrides() {
        let cfg = EmbeddingConfig::new("e", "m", "k").with_timeout(3);
        assert_eq!(cfg.timeout_seconds, 3);
    }
}
