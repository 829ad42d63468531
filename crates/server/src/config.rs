use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level server configuration, loaded from TOML with environment-backed
/// overrides (`WARDEN_*`) taking precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub server: ServerSection,
    pub contract: ContractSection,
    pub cache: CacheSection,
    pub upstream: UpstreamSection,
    pub evaluator: EvaluatorSection,
    pub breaker: BreakerSection,
    pub telemetry: TelemetrySection,
    pub policy: PolicySection,
    pub guardrails: GuardrailsSection,
    pub smart: SmartSection,
    pub judge: JudgeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Grace window for draining in-flight requests at shutdown.
    pub shutdown_grace_s: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
            shutdown_grace_s: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractSection {
    /// Base URL of the contract registry (`{url}/contracts/{id}`).
    pub url: Option<String>,
    /// Bearer token for the registry.
    pub auth_token: Option<String>,
    /// Local directory of `{id}.json` contract documents (dev mode);
    /// used when no registry URL is configured.
    pub dir: Option<PathBuf>,
    /// Registry fetch timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ContractSection {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            dir: None,
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// `memory` or `redis` (the latter behind the `redis` cargo feature).
    pub backend: String,
    /// Redis connection URL when `backend = "redis"`.
    pub redis_url: Option<String>,
    /// Entry bound for the in-process cache.
    pub max_entries: u64,
    /// Contract document TTL in seconds.
    pub contract_ttl_s: u64,
    /// Hot validation result TTL in seconds.
    pub result_ttl_s: u64,
    /// Guardrail config TTL in seconds.
    pub guardrail_ttl_s: u64,
    /// Per-operation cache deadline in milliseconds.
    pub op_timeout_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            redis_url: None,
            max_entries: 10_000,
            contract_ttl_s: 300,
            result_ttl_s: 60,
            guardrail_ttl_s: 600,
            op_timeout_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    /// URL prefixes callers may target; empty allows any http(s) URL.
    pub allowlist: Vec<String>,
    /// Total upstream deadline in milliseconds.
    pub timeout_ms: u64,
    /// Largest response body buffered for post-checking.
    pub max_body_bytes: usize,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            timeout_ms: 30_000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSection {
    /// Budget for regex/keyword/hybrid/smart/kernel evaluators (ms).
    pub fast_timeout_ms: u64,
    /// Budget for the external judge call (ms).
    pub llm_timeout_ms: u64,
}

impl Default for EvaluatorSection {
    fn default() -> Self {
        Self {
            fast_timeout_ms: 200,
            llm_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    /// Consecutive failures before a dependency circuit opens.
    pub failure_threshold: u32,
    /// Open-state cool-down in seconds.
    pub cooldown_s: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_s: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// Collector endpoint; batches are discarded when unset.
    pub sink_url: Option<String>,
    /// Bearer token for the collector.
    pub auth_token: Option<String>,
    /// Records per batch.
    pub batch_size: usize,
    /// Flush interval for partial batches (ms).
    pub batch_interval_ms: u64,
    /// Bounded queue capacity between requests and the worker.
    pub queue_capacity: usize,
    /// NDJSON spill file path.
    pub spill_path: PathBuf,
    /// Spill rotation bound in bytes.
    pub spill_max_bytes: u64,
    /// Sink publish timeout (ms).
    pub sink_timeout_ms: u64,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            sink_url: None,
            auth_token: None,
            batch_size: 100,
            batch_interval_ms: 5_000,
            queue_capacity: 1024,
            spill_path: PathBuf::from("warden-telemetry.ndjson"),
            spill_max_bytes: 8 * 1024 * 1024,
            sink_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Proceed unenforced when the contract source is unavailable.
    /// Disabled by default: outages fail closed.
    pub fail_open: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailsSection {
    /// Directory for persisted dynamic guardrails (`{id}.json`).
    pub repo_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartSection {
    /// Embeddings endpoint; semantic evaluators degrade to lexical paths
    /// when unset.
    pub embedding_endpoint: Option<String>,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Bearer token for the embedding provider.
    pub api_key: Option<String>,
    /// Lower zone threshold (below allows).
    pub t_allow: f64,
    /// Upper zone threshold (above blocks).
    pub t_block: f64,
    /// Weight of the embedding half of the fused score.
    pub embedding_weight: f64,
    /// Weight of the lexical half of the fused score.
    pub lexical_weight: f64,
}

impl Default for SmartSection {
    fn default() -> Self {
        Self {
            embedding_endpoint: None,
            embedding_model: "text-embedding-3-small".into(),
            api_key: None,
            t_allow: 0.35,
            t_block: 0.65,
            embedding_weight: 0.6,
            lexical_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeSection {
    /// Chat-completions endpoint of the judge model; LLM-assisted
    /// guardrails fall back to keywords when unset.
    pub endpoint: Option<String>,
    /// Judge model identifier.
    pub model: Option<String>,
    /// Bearer token for the judge.
    pub api_key: Option<String>,
}

impl WardenConfig {
    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply environment-backed overrides. Environment always wins over the
    /// file so deployments can tweak a packaged config without editing it.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("WARDEN_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("WARDEN_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(url) = std::env::var("WARDEN_CONTRACT_URL") {
            self.contract.url = Some(url);
        }
        if let Ok(token) = std::env::var("WARDEN_CONTRACT_TOKEN") {
            self.contract.auth_token = Some(token);
        }
        if let Ok(url) = std::env::var("WARDEN_REDIS_URL") {
            self.cache.backend = "redis".into();
            self.cache.redis_url = Some(url);
        }
        if let Some(fail_open) = env_parse("WARDEN_POLICY_FAIL_OPEN") {
            self.policy.fail_open = fail_open;
        }
        if let Ok(url) = std::env::var("WARDEN_TELEMETRY_SINK_URL") {
            self.telemetry.sink_url = Some(url);
        }
        if let Ok(dir) = std::env::var("WARDEN_GUARDRAILS_REPO_DIR") {
            self.guardrails.repo_dir = Some(PathBuf::from(dir));
        }
        if let Ok(endpoint) = std::env::var("WARDEN_EMBEDDING_ENDPOINT") {
            self.smart.embedding_endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("WARDEN_EMBEDDING_API_KEY") {
            self.smart.api_key = Some(key);
        }
        if let Ok(endpoint) = std::env::var("WARDEN_JUDGE_ENDPOINT") {
            self.judge.endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("WARDEN_JUDGE_API_KEY") {
            self.judge.api_key = Some(key);
        }
    }

    /// Validate cross-field constraints. Failures here are fatal at startup
    /// (exit code 2).
    pub fn validate(&self) -> Result<(), String> {
        if self.cache.backend != "memory" && self.cache.backend != "redis" {
            return Err(format!(
                "cache.backend must be 'memory' or 'redis', got '{}'",
                self.cache.backend
            ));
        }
        if self.cache.backend == "redis" && self.cache.redis_url.is_none() {
            return Err("cache.backend = 'redis' requires cache.redis_url".into());
        }
        if self.contract.url.is_none() && self.contract.dir.is_none() {
            return Err("one of contract.url or contract.dir is required".into());
        }
        if self.breaker.failure_threshold == 0 {
            return Err("breaker.failure_threshold must be >= 1".into());
        }
        if self.telemetry.batch_size == 0 {
            return Err("telemetry.batch_size must be >= 1".into());
        }
        if self.telemetry.queue_capacity == 0 {
            return Err("telemetry.queue_capacity must be >= 1".into());
        }
        if self.smart.t_allow >= self.smart.t_block {
            return Err("smart.t_allow must be < smart.t_block".into());
        }
        for prefix in &self.upstream.allowlist {
            if !prefix.starts_with("http://") && !prefix.starts_with("https://") {
                return Err(format!("upstream.allowlist entry '{prefix}' is not an http(s) prefix"));
            }
        }
        if self.judge.endpoint.is_some() && self.judge.model.is_none() {
            return Err("judge.endpoint requires judge.model".into());
        }
        Ok(())
    }

    /// Total upstream deadline.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok())
}
