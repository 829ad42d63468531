use std::sync::Arc;
use std::time::Duration;

use warden_cache::CacheStore;
use warden_contract::ContractStore;
use warden_guardrails::{Evaluators, GuardrailRegistry};
use warden_telemetry::TelemetryHandle;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::pipeline::EnforcementPipeline;
use crate::upstream::{UpstreamConfig, UpstreamProxy};

/// Builder assembling the enforcement pipeline's explicit dependency graph.
///
/// There are no process-wide singletons: the contract store, registry,
/// evaluators, and telemetry handle are constructed by the caller (once) and
/// handed in here, which keeps init and teardown order visible at the
/// composition root.
#[derive(Default)]
pub struct GatewayBuilder {
    contracts: Option<Arc<ContractStore>>,
    registry: Option<Arc<GuardrailRegistry>>,
    evaluators: Option<Arc<Evaluators>>,
    telemetry: Option<TelemetryHandle>,
    upstream_config: Option<UpstreamConfig>,
    result_cache: Option<(Arc<dyn CacheStore>, Duration)>,
    config: GatewayConfig,
}

impl GatewayBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Contract store (required).
    pub fn contracts(mut self, contracts: Arc<ContractStore>) -> Self {
        self.contracts = Some(contracts);
        self
    }

    /// Guardrail registry (required).
    pub fn registry(mut self, registry: Arc<GuardrailRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Evaluator engine (required).
    pub fn evaluators(mut self, evaluators: Arc<Evaluators>) -> Self {
        self.evaluators = Some(evaluators);
        self
    }

    /// Telemetry producer handle (required).
    pub fn telemetry(mut self, telemetry: TelemetryHandle) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Upstream proxy configuration (optional, defaults apply).
    pub fn upstream_config(mut self, config: UpstreamConfig) -> Self {
        self.upstream_config = Some(config);
        self
    }

    /// Enable the hot validation-result cache (optional): identical payloads
    /// under the same policy digest reuse their verdict within `ttl`.
    pub fn result_cache(mut self, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        self.result_cache = Some((cache, ttl));
        self
    }

    /// Pipeline configuration (optional, defaults apply).
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the pipeline, validating that every required dependency is
    /// present.
    pub fn build(self) -> Result<EnforcementPipeline, GatewayError> {
        let contracts = self
            .contracts
            .ok_or(GatewayError::MissingDependency("contract store"))?;
        let registry = self
            .registry
            .ok_or(GatewayError::MissingDependency("guardrail registry"))?;
        let evaluators = self
            .evaluators
            .ok_or(GatewayError::MissingDependency("evaluators"))?;
        let telemetry = self
            .telemetry
            .ok_or(GatewayError::MissingDependency("telemetry handle"))?;

        let mut upstream_config = self.upstream_config.unwrap_or_default();
        // The buffering bound is one knob; the pipeline's copy wins.
        upstream_config.max_body_bytes = self.config.max_body_bytes;
        let upstream = UpstreamProxy::new(upstream_config)
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(EnforcementPipeline::new(
            contracts,
            registry,
            evaluators,
            upstream,
            telemetry,
            Arc::new(GatewayMetrics::default()),
            self.config,
            self.result_cache,
        ))
    }
}

impl std::fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("contracts", &self.contracts.is_some())
            .field("registry", &self.registry.is_some())
            .field("evaluators", &self.evaluators.is_some())
            .field("telemetry", &self.telemetry.is_some())
            .finish_non_exhaustive()
    }
}
