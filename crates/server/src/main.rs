use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use warden_cache::{CacheStore, MemoryCache};
use warden_contract::{ContractSource, ContractStore, DirContractSource, HttpContractSource};
use warden_core::{BreakerSet, CircuitBreakerConfig};
use warden_embedding::{
    CacheTier, EmbeddingCache, EmbeddingConfig, EmbeddingMetrics, HttpEmbeddingProvider,
};
use warden_gateway::{GatewayBuilder, GatewayConfig, UpstreamConfig};
use warden_guardrails::{EvaluatorTimeouts, Evaluators, GuardrailRegistry};
use warden_guardrails::evaluator::EmbeddingStack;
use warden_llm::{HttpJudge, JudgeConfig};
use warden_server::api::{AppState, router};
use warden_server::config::WardenConfig;
use warden_telemetry::{
    DiscardSink, HttpSink, TelemetryConfig, TelemetryPipeline, TelemetrySink,
};

/// Warden enforcement proxy HTTP server.
#[derive(Parser, Debug)]
#[command(name = "warden-server", about = "Policy-enforcement proxy for AI/LLM traffic")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "warden.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

/// Exit codes: 0 clean shutdown, 1 fatal init, 2 invalid config, 3 required
/// dependency unavailable at init under fail-closed.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(message) => {
            error!(%message, "invalid configuration");
            return ExitCode::from(2);
        }
    };
    config.apply_env_overrides();
    if let Err(message) = config.validate() {
        error!(%message, "invalid configuration");
        return ExitCode::from(2);
    }

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal initialization error");
            ExitCode::from(1)
        }
    }
}

fn load_config(path: &str) -> Result<WardenConfig, String> {
    if Path::new(path).exists() {
        let contents =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))?;
        WardenConfig::from_toml(&contents).map_err(|e| format!("failed to parse {path}: {e}"))
    } else {
        info!(%path, "config file not found, using defaults");
        WardenConfig::from_toml("").map_err(|e| e.to_string())
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli, config: WardenConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    // -- Cache ------------------------------------------------------------
    let cache: Arc<dyn CacheStore> = build_cache(&config).await?;

    // -- Circuit breakers -------------------------------------------------
    let breaker_config = CircuitBreakerConfig {
        failure_threshold: config.breaker.failure_threshold,
        cooldown: Duration::from_secs(config.breaker.cooldown_s),
    };
    let mut breakers = BreakerSet::new();
    let contract_breaker = breakers.register("contract_source", breaker_config.clone());
    let embedding_breaker = config
        .smart
        .embedding_endpoint
        .is_some()
        .then(|| breakers.register("embedding", breaker_config.clone()));
    let judge_breaker = config
        .judge
        .endpoint
        .is_some()
        .then(|| breakers.register("judge", breaker_config));
    let breakers = Arc::new(breakers);

    // -- Contract store ---------------------------------------------------
    let source: Arc<dyn ContractSource> = if let Some(url) = &config.contract.url {
        Arc::new(HttpContractSource::new(
            url.clone(),
            config.contract.auth_token.clone(),
            Duration::from_millis(config.contract.timeout_ms),
        )?)
    } else if let Some(dir) = &config.contract.dir {
        Arc::new(DirContractSource::new(dir.clone()))
    } else {
        unreachable!("validated: one contract source is configured");
    };

    // Fail-closed deployments refuse to start when the registry is down:
    // every request would 503 anyway (exit code 3).
    if !config.policy.fail_open {
        if let Some(url) = &config.contract.url {
            let probe = reqwest::Client::builder()
                .timeout(Duration::from_millis(config.contract.timeout_ms))
                .build()?;
            if let Err(e) = probe.get(url.clone()).send().await {
                error!(%url, error = %e, "contract registry unreachable at init (fail-closed)");
                return Ok(ExitCode::from(3));
            }
        }
    }

    let contracts = Arc::new(ContractStore::new(
        Arc::clone(&cache),
        source,
        contract_breaker,
        Duration::from_secs(config.cache.contract_ttl_s),
    ));

    // -- Guardrail registry -----------------------------------------------
    let mut registry = GuardrailRegistry::with_builtins();
    if let Some(dir) = &config.guardrails.repo_dir {
        registry = registry.with_repo_dir(dir.clone());
    }
    // Corrupt persisted state is fatal at init, not silently skipped.
    let loaded = registry.load_persisted()?;
    if loaded > 0 {
        info!(count = loaded, "dynamic guardrails restored");
    }
    let registry = Arc::new(registry);

    // -- Evaluators -------------------------------------------------------
    let mut evaluators = Evaluators::new(EvaluatorTimeouts {
        fast: Duration::from_millis(config.evaluator.fast_timeout_ms),
        llm: Duration::from_millis(config.evaluator.llm_timeout_ms),
    });

    let mut embedding_metrics = None;
    if let Some(endpoint) = &config.smart.embedding_endpoint {
        let provider = Arc::new(HttpEmbeddingProvider::new(EmbeddingConfig::new(
            endpoint.clone(),
            config.smart.embedding_model.clone(),
            config.smart.api_key.clone().unwrap_or_default(),
        ))?);
        let metrics = Arc::new(EmbeddingMetrics::default());
        let stack = EmbeddingStack {
            payload: Arc::new(EmbeddingCache::new(
                Arc::clone(&provider) as _,
                4096,
                Duration::from_secs(config.cache.result_ttl_s),
                Arc::clone(&metrics),
                CacheTier::Payload,
            )),
            anchor: Arc::new(EmbeddingCache::new(
                provider,
                4096,
                Duration::from_secs(config.cache.guardrail_ttl_s),
                Arc::clone(&metrics),
                CacheTier::Anchor,
            )),
            metrics: Arc::clone(&metrics),
            breaker: embedding_breaker,
        };
        evaluators = evaluators.with_embedding(stack);
        embedding_metrics = Some(metrics);
        info!(model = %config.smart.embedding_model, "embedding backend enabled");
    }

    if let (Some(endpoint), Some(model)) = (&config.judge.endpoint, &config.judge.model) {
        let judge = HttpJudge::new(
            JudgeConfig::new(
                endpoint.clone(),
                model.clone(),
                config.judge.api_key.clone().unwrap_or_default(),
            )
            .with_timeout(config.evaluator.llm_timeout_ms.div_ceil(1000)),
        )?;
        evaluators = evaluators.with_judge(Arc::new(judge));
        if let Some(breaker) = judge_breaker {
            evaluators = evaluators.with_judge_breaker(breaker);
        }
        info!(model = %model, "judge backend enabled");
    }
    let evaluators = Arc::new(evaluators);

    // -- Telemetry (started last, stopped first) --------------------------
    let sink: Arc<dyn TelemetrySink> = match &config.telemetry.sink_url {
        Some(url) => Arc::new(HttpSink::new(
            url.clone(),
            config.telemetry.auth_token.clone(),
            Duration::from_millis(config.telemetry.sink_timeout_ms),
        )?),
        None => {
            warn!("no telemetry sink configured, batches will be discarded");
            Arc::new(DiscardSink)
        }
    };
    let telemetry = TelemetryPipeline::start(
        TelemetryConfig {
            queue_capacity: config.telemetry.queue_capacity,
            batch_size: config.telemetry.batch_size,
            batch_interval: Duration::from_millis(config.telemetry.batch_interval_ms),
            spill_path: config.telemetry.spill_path.clone(),
            spill_max_bytes: config.telemetry.spill_max_bytes,
        },
        sink,
    );

    // -- Pipeline ---------------------------------------------------------
    let pipeline = Arc::new(
        GatewayBuilder::new()
            .contracts(contracts)
            .registry(Arc::clone(&registry))
            .evaluators(evaluators)
            .telemetry(telemetry.handle())
            .upstream_config(UpstreamConfig {
                allowlist: config.upstream.allowlist.clone(),
                timeout: config.upstream_timeout(),
                max_body_bytes: config.upstream.max_body_bytes,
            })
            .result_cache(
                Arc::clone(&cache),
                Duration::from_secs(config.cache.result_ttl_s),
            )
            .config(GatewayConfig {
                request_timeout: config.upstream_timeout(),
                fail_open: config.policy.fail_open,
                max_body_bytes: config.upstream.max_body_bytes,
            })
            .build()?,
    );

    let state = AppState {
        pipeline,
        registry,
        telemetry: telemetry.handle(),
        breakers,
        cache,
        embedding_metrics,
        version: env!("CARGO_PKG_VERSION"),
    };
    let app = router(state);

    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "warden-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain telemetry within the grace window.
    let grace = Duration::from_secs(config.server.shutdown_grace_s);
    if tokio::time::timeout(grace, telemetry.shutdown()).await.is_err() {
        warn!(grace_s = config.server.shutdown_grace_s, "telemetry drain exceeded grace window");
    }

    info!("warden-server shut down");
    Ok(ExitCode::SUCCESS)
}

async fn build_cache(config: &WardenConfig) -> Result<Arc<dyn CacheStore>, Box<dyn std::error::Error>> {
    match config.cache.backend.as_str() {
        #[cfg(feature = "redis")]
        "redis" => {
            let url = config
                .cache
                .redis_url
                .as_deref()
                .expect("validated: redis_url present");
            let cache = warden_cache::RedisCache::connect(
                url,
                "warden",
                Duration::from_millis(config.cache.op_timeout_ms),
            )
            .await?;
            info!("redis cache backend initialized");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        "redis" => Err("cache.backend = 'redis' requires the 'redis' cargo feature".into()),
        _ => Ok(Arc::new(MemoryCache::new(config.cache.max_entries))),
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
