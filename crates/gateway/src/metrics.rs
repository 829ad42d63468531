use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use warden_core::EvaluatorKind;

/// Histogram bucket upper bounds for evaluator latency, in milliseconds.
pub const LATENCY_BUCKETS_MS: [u64; 8] = [1, 5, 10, 25, 50, 100, 500, 5000];

/// Fixed-bucket latency histogram on atomics.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len()],
    overflow: AtomicU64,
    sum_ms: AtomicU64,
    count: AtomicU64,
}

/// Point-in-time view of a [`LatencyHistogram`].
#[derive(Debug, Clone, Serialize)]
pub struct LatencyHistogramSnapshot {
    /// Cumulative counts per bucket, aligned with [`LATENCY_BUCKETS_MS`].
    pub buckets: Vec<u64>,
    /// Observations above the largest bucket.
    pub overflow: u64,
    /// Sum of observed latencies in milliseconds.
    pub sum_ms: u64,
    /// Number of observations.
    pub count: u64,
}

impl LatencyHistogram {
    /// Record one observation.
    pub fn observe(&self, latency_ms: u64) {
        match LATENCY_BUCKETS_MS.iter().position(|bound| latency_ms <= *bound) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
        self.sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view with cumulative bucket counts.
    pub fn snapshot(&self) -> LatencyHistogramSnapshot {
        let mut cumulative = 0;
        let buckets = self
            .buckets
            .iter()
            .map(|bucket| {
                cumulative += bucket.load(Ordering::Relaxed);
                cumulative
            })
            .collect();
        LatencyHistogramSnapshot {
            buckets,
            overflow: self.overflow.load(Ordering::Relaxed),
            sum_ms: self.sum_ms.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
        }
    }
}

const EVALUATOR_KINDS: [EvaluatorKind; 7] = [
    EvaluatorKind::Regex,
    EvaluatorKind::Keyword,
    EvaluatorKind::Hybrid,
    EvaluatorKind::Smart,
    EvaluatorKind::LlmAssisted,
    EvaluatorKind::DlmKernel,
    EvaluatorKind::Composite,
];

fn kind_index(kind: EvaluatorKind) -> usize {
    EVALUATOR_KINDS
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(EVALUATOR_KINDS.len() - 1)
}

/// Atomic counters tracking enforcement outcomes.
///
/// All counters use relaxed ordering for throughput; call
/// [`snapshot`](Self::snapshot) for a consistent point-in-time view.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Total requests entering the pipeline.
    pub requests: AtomicU64,
    /// Requests forwarded and answered with the upstream response.
    pub allowed: AtomicU64,
    /// Requests blocked on the input payload.
    pub blocked_input: AtomicU64,
    /// Requests blocked on the output payload.
    pub blocked_output: AtomicU64,
    /// Guardrail threshold violations observed.
    pub guardrail_violations: AtomicU64,
    /// Envelope bound violations observed.
    pub envelope_violations: AtomicU64,
    /// Requests failed on contract resolution.
    pub resolution_failures: AtomicU64,
    /// Requests failed on the upstream exchange.
    pub upstream_failures: AtomicU64,
    /// Requests let through unenforced under the fail-open policy.
    pub fail_open_passes: AtomicU64,
    /// Responses too large to post-check.
    pub post_check_skipped: AtomicU64,
    /// Per-evaluator-kind latency histograms.
    evaluator_latency: [LatencyHistogram; EVALUATOR_KINDS.len()],
}

/// Point-in-time view of [`GatewayMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub allowed: u64,
    pub blocked_input: u64,
    pub blocked_output: u64,
    pub guardrail_violations: u64,
    pub envelope_violations: u64,
    pub resolution_failures: u64,
    pub upstream_failures: u64,
    pub fail_open_passes: u64,
    pub post_check_skipped: u64,
    /// Latency histograms keyed by evaluator kind tag.
    pub evaluator_latency: Vec<(String, LatencyHistogramSnapshot)>,
}

impl GatewayMetrics {
    /// Record a request entering the pipeline.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an allowed request.
    pub fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an input-phase block.
    pub fn record_blocked_input(&self) {
        self.blocked_input.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an output-phase block.
    pub fn record_blocked_output(&self) {
        self.blocked_output.fetch_add(1, Ordering::Relaxed);
    }

    /// Record observed violations by type.
    pub fn record_violations(&self, guardrail: u64, envelope: u64) {
        if guardrail > 0 {
            self.guardrail_violations.fetch_add(guardrail, Ordering::Relaxed);
        }
        if envelope > 0 {
            self.envelope_violations.fetch_add(envelope, Ordering::Relaxed);
        }
    }

    /// Record a contract resolution failure.
    pub fn record_resolution_failure(&self) {
        self.resolution_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upstream exchange failure.
    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request passed unenforced under fail-open.
    pub fn record_fail_open_pass(&self) {
        self.fail_open_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response too large to post-check.
    pub fn record_post_check_skipped(&self) {
        self.post_check_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an evaluator latency observation.
    pub fn observe_evaluator_latency(&self, kind: EvaluatorKind, latency_ms: u64) {
        self.evaluator_latency[kind_index(kind)].observe(latency_ms);
    }

    /// Consistent point-in-time view of all counters and histograms.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            blocked_input: self.blocked_input.load(Ordering::Relaxed),
            blocked_output: self.blocked_output.load(Ordering::Relaxed),
            guardrail_violations: self.guardrail_violations.load(Ordering::Relaxed),
            envelope_violations: self.envelope_violations.load(Ordering::Relaxed),
            resolution_failures: self.resolution_failures.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            fail_open_passes: self.fail_open_passes.load(Ordering::Relaxed),
            post_check_skipped: self.post_check_skipped.load(Ordering::Relaxed),
            evaluator_latency: EVALUATOR_KINDS
                .iter()
                .enumerate()
                .map(|(idx, kind)| (kind.to_string(), self.evaluator_latency[idx].snapshot()))
                .collect(),
        }
    }
}
