use std::fmt::Write;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;

use warden_core::CircuitState;
use warden_gateway::{LATENCY_BUCKETS_MS, MetricsSnapshot};

use super::AppState;

/// Prometheus text exposition format content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// `GET /metrics` -- counters, histograms, and gauges in Prometheus text
/// exposition format.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    summary = "Prometheus metrics",
    description = "Returns enforcement counters, evaluator latency histograms, cache hit ratio, and circuit state gauges.",
    responses(
        (status = 200, description = "Prometheus text format metrics", content_type = "text/plain")
    )
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snap = state.pipeline.metrics().snapshot();
    let mut buf = render_snapshot(&snap);

    write_counter(
        &mut buf,
        "warden_telemetry_dropped_total",
        "Telemetry records dropped due to a full queue.",
        state.telemetry.dropped(),
    );

    let cache = state.cache.stats();
    write_gauge(
        &mut buf,
        "warden_cache_hit_ratio",
        "Cache hit ratio in [0, 1].",
        cache.hit_ratio(),
    );
    write_counter(
        &mut buf,
        "warden_cache_hits_total",
        "Cache reads served from the cache.",
        cache.hits,
    );
    write_counter(
        &mut buf,
        "warden_cache_misses_total",
        "Cache reads that fell through.",
        cache.misses,
    );

    // Circuit gauges: closed=0, half_open=1, open=2.
    let _ = writeln!(
        buf,
        "# HELP warden_circuit_state Circuit state per dependency (0=closed, 1=half_open, 2=open)."
    );
    let _ = writeln!(buf, "# TYPE warden_circuit_state gauge");
    for (name, circuit) in state.breakers.snapshot() {
        let value = match circuit {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        };
        let _ = writeln!(
            buf,
            "warden_circuit_state{{dependency=\"{}\"}} {value}",
            escape_label(&name)
        );
    }

    if let Some(embedding) = state.embedding_metrics.as_ref() {
        let es = embedding.snapshot();
        write_counter(
            &mut buf,
            "warden_embedding_anchor_cache_hits_total",
            "Anchor embeddings served from cache.",
            es.anchor_hits,
        );
        write_counter(
            &mut buf,
            "warden_embedding_anchor_cache_misses_total",
            "Anchor embeddings requiring a provider call.",
            es.anchor_misses,
        );
        write_counter(
            &mut buf,
            "warden_embedding_payload_cache_hits_total",
            "Payload embeddings served from cache.",
            es.payload_hits,
        );
        write_counter(
            &mut buf,
            "warden_embedding_payload_cache_misses_total",
            "Payload embeddings requiring a provider call.",
            es.payload_misses,
        );
        write_counter(
            &mut buf,
            "warden_embedding_errors_total",
            "Embedding provider errors.",
            es.errors,
        );
        write_counter(
            &mut buf,
            "warden_embedding_lexical_fallbacks_total",
            "Semantic checks degraded to their lexical fallback.",
            es.lexical_fallbacks,
        );
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        buf,
    )
}

/// Render a [`MetricsSnapshot`] into Prometheus text exposition format.
///
/// Extracted from the handler so it can be unit tested without `AppState`.
fn render_snapshot(snap: &MetricsSnapshot) -> String {
    let mut buf = String::with_capacity(4096);

    write_counter(
        &mut buf,
        "warden_requests_total",
        "Total requests entering the enforcement pipeline.",
        snap.requests,
    );
    write_counter(
        &mut buf,
        "warden_requests_allowed_total",
        "Requests forwarded and answered with the upstream response.",
        snap.allowed,
    );
    write_counter(
        &mut buf,
        "warden_requests_blocked_input_total",
        "Requests blocked on the input payload.",
        snap.blocked_input,
    );
    write_counter(
        &mut buf,
        "warden_requests_blocked_output_total",
        "Requests blocked on the output payload.",
        snap.blocked_output,
    );

    let _ = writeln!(
        buf,
        "# HELP warden_violations_total Policy violations observed, by type."
    );
    let _ = writeln!(buf, "# TYPE warden_violations_total counter");
    let _ = writeln!(
        buf,
        "warden_violations_total{{type=\"guardrail\"}} {}",
        snap.guardrail_violations
    );
    let _ = writeln!(
        buf,
        "warden_violations_total{{type=\"envelope\"}} {}",
        snap.envelope_violations
    );

    write_counter(
        &mut buf,
        "warden_resolution_failures_total",
        "Requests failed on contract resolution.",
        snap.resolution_failures,
    );
    write_counter(
        &mut buf,
        "warden_upstream_failures_total",
        "Requests failed on the upstream exchange.",
        snap.upstream_failures,
    );
    write_counter(
        &mut buf,
        "warden_fail_open_passes_total",
        "Requests passed unenforced under the fail-open policy.",
        snap.fail_open_passes,
    );
    write_counter(
        &mut buf,
        "warden_post_check_skipped_total",
        "Responses too large to post-check.",
        snap.post_check_skipped,
    );

    let _ = writeln!(
        buf,
        "# HELP warden_evaluator_duration_seconds Evaluator latency by kind."
    );
    let _ = writeln!(buf, "# TYPE warden_evaluator_duration_seconds histogram");
    for (kind, histogram) in &snap.evaluator_latency {
        let kind = escape_label(kind);
        for (bound_ms, cumulative) in LATENCY_BUCKETS_MS.iter().zip(&histogram.buckets) {
            #[allow(clippy::cast_precision_loss)]
            let le = *bound_ms as f64 / 1000.0;
            let _ = writeln!(
                buf,
                "warden_evaluator_duration_seconds_bucket{{kind=\"{kind}\",le=\"{le}\"}} {cumulative}"
            );
        }
        let total = histogram.buckets.last().copied().unwrap_or(0) + histogram.overflow;
        let _ = writeln!(
            buf,
            "warden_evaluator_duration_seconds_bucket{{kind=\"{kind}\",le=\"+Inf\"}} {total}"
        );
        #[allow(clippy::cast_precision_loss)]
        let sum_seconds = histogram.sum_ms as f64 / 1000.0;
        let _ = writeln!(
            buf,
            "warden_evaluator_duration_seconds_sum{{kind=\"{kind}\"}} {sum_seconds}"
        );
        let _ = writeln!(
            buf,
            "warden_evaluator_duration_seconds_count{{kind=\"{kind}\"}} {}",
            histogram.count
        );
    }

    buf
}

fn write_counter(buf: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(buf, "# HELP {name} {help}");
    let _ = writeln!(buf, "# TYPE {name} counter");
    let _ = writeln!(buf, "{name} {value}");
}

fn write_gauge(buf: &mut String, name: &str, help: &str, value: f64) {
    let _ = writeln!(buf, "# HELP {name} {help}");
    let _ = writeln!(buf, "# TYPE {name} gauge");
    let _ = writeln!(buf, "{name} {value}");
}

/// Escape a label value per the Prometheus text exposition format.
fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
