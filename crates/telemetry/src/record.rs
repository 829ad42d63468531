use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{CheckPhase, Severity, Violation};

/// One completed request through the enforcement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Tenant fingerprint.
    pub tenant: String,
    /// Trace id shared with the caller's response.
    pub trace_id: String,
    /// Contract the request was enforced against.
    pub contract_id: String,
    /// HTTP method of the proxied call.
    pub method: String,
    /// Path of the proxied call.
    pub path: String,
    /// Status code returned to the caller.
    pub status: u16,
    /// Terminal decision (`allowed`, `blocked_input`, `blocked_output`,
    /// `failed`).
    pub decision: String,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,
    /// Request body size in bytes.
    pub request_bytes: u64,
    /// Response body size in bytes (zero when nothing was returned).
    pub response_bytes: u64,
    /// True when the response was too large to post-check.
    #[serde(default)]
    pub post_check_skipped: bool,
    /// UTC completion time.
    pub timestamp: DateTime<Utc>,
}

/// One policy violation observed while enforcing a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Tenant fingerprint.
    pub tenant: String,
    /// Trace id of the offending request.
    pub trace_id: String,
    /// Contract the violation was found under.
    pub contract_id: String,
    /// `guardrail` or `envelope`.
    pub violation_type: String,
    /// Metric the violation concerns.
    pub metric: String,
    /// Observed value.
    pub value: f64,
    /// Lower bound, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Violation severity.
    pub severity: Severity,
    /// Which payload the violation was found in.
    pub phase: CheckPhase,
    /// Optional short detail. Never contains payload content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// UTC observation time.
    pub timestamp: DateTime<Utc>,
}

impl ViolationRecord {
    /// Build a record from a pipeline violation.
    pub fn from_violation(
        tenant: &str,
        trace_id: &str,
        contract_id: &str,
        violation_type: &str,
        violation: &Violation,
    ) -> Self {
        Self {
            tenant: tenant.to_owned(),
            trace_id: trace_id.to_owned(),
            contract_id: contract_id.to_owned(),
            violation_type: violation_type.to_owned(),
            metric: violation.metric.clone(),
            value: violation.value,
            min: violation.min,
            max: violation.max,
            severity: violation.severity,
            phase: violation.phase,
            detail: violation.detail.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// A telemetry record: either a completed request or a violation.
///
/// Spilled to disk as one JSON object per line; the `kind` tag makes the
/// spill self-describing for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Request(RequestRecord),
    Violation(ViolationRecord),
}

impl TelemetryRecord {
    /// Tenant fingerprint carried by every record.
    pub fn tenant(&self) -> &str {
        match self {
            Self::Request(r) => &r.tenant,
            Self::Violation(v) => &v.tenant,
        }
    }

    /// Trace id carried by every record.
    pub fn trace_id(&self) -> &str {
        match self {
            Self::Request(r) => &r.trace_id,
            Self::Violation(v) => &v.trace_id,
        }
    }

    /// SSE event name for the live stream.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Violation(_) => "violation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_record() -> RequestRecord {
        RequestRecord {
            tenant: "t1".into(),
            trace_id: "trace-1".into(),
            contract_id: "c1".into(),
            method: "POST".into(),
            path: "/api/proxy".into(),
            status: 200,
            decision: "allowed".into(),
            latency_ms: 12,
            request_bytes: 100,
            response_bytes: 250,
            post_check_skipped: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn tagged_roundtrip() {
        let record = TelemetryRecord::Request(request_record());
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"kind\":\"request\""));

        let back: TelemetryRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.trace_id(), "trace-1");
        assert_eq!(back.tenant(), "t1");
        assert_eq!(back.event_name(), "request");
    }

    #[test]
    fn violation_from_pipeline_violation() {
        let violation = Violation {
            metric: "hipaa_compliance".into(),
            value: 0.6,
            min: Some(0.8),
            max: Some(1.0),
            severity: Severity::High,
            phase: CheckPhase::Output,
            detail: None,
        };
        let record =
            ViolationRecord::from_violation("t1", "trace-1", "c1", "envelope", &violation);
        assert_eq!(record.violation_type, "envelope");
        assert!((record.value - 0.6).abs() < 1e-9);
        assert_eq!(record.min, Some(0.8));

        let wrapped = TelemetryRecord::Violation(record);
        assert_eq!(wrapped.event_name(), "violation");
    }
}
