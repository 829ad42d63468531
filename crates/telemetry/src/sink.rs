use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::record::TelemetryRecord;

/// Errors publishing a batch to the telemetry sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport-level failure.
    #[error("telemetry sink http error: {0}")]
    Http(String),

    /// The sink returned a non-success status.
    #[error("telemetry sink returned status {0}")]
    Status(u16),

    /// The sink did not respond within its deadline.
    #[error("telemetry sink timed out")]
    Timeout,
}

/// Destination for telemetry batches.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Publish a batch of records. A batch is all-or-nothing: on error the
    /// caller spills the whole batch for replay.
    async fn publish(&self, batch: &[TelemetryRecord]) -> Result<(), SinkError>;
}

/// HTTP sink POSTing JSON batches to a collector endpoint.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpSink {
    /// Create a sink for the collector at `url`.
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            auth_token,
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn publish(&self, batch: &[TelemetryRecord]) -> Result<(), SinkError> {
        debug!(url = %self.url, records = batch.len(), "publishing telemetry batch");

        let mut request = self.client.post(&self.url).json(batch);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SinkError::Timeout
            } else {
                SinkError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink").field("url", &self.url).finish_non_exhaustive()
    }
}

/// Sink that acknowledges and discards every batch, for deployments without
/// a collector. The pipeline still runs so drop counters and the live SSE
/// stream keep working.
#[derive(Debug, Default)]
pub struct DiscardSink;

#[async_trait]
impl TelemetrySink for DiscardSink {
    async fn publish(&self, batch: &[TelemetryRecord]) -> Result<(), SinkError> {
        debug!(records = batch.len(), "discarding telemetry batch (no sink configured)");
        Ok(())
    }
}

/// In-memory sink for tests: captures published records and can simulate an
/// outage.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: parking_lot::Mutex<Vec<TelemetryRecord>>,
    fail: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (simulated outage).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    /// All records published so far.
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().clone()
    }

    /// Number of records published so far.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn publish(&self, batch: &[TelemetryRecord]) -> Result<(), SinkError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(SinkError::Http("simulated outage".to_owned()));
        }
        self.records.lock().extend_from_slice(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RequestRecord;
    use chrono::Utc;

    fn record(trace: &str) -> TelemetryRecord {
        TelemetryRecord::Request(RequestRecord {
            tenant: "t".into(),
            trace_id: trace.into(),
            contract_id: "c".into(),
            method: "POST".into(),
            path: "/api/proxy".into(),
            status: 200,
            decision: "allowed".into(),
            latency_ms: 1,
            request_bytes: 0,
            response_bytes: 0,
            post_check_skipped: false,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn memory_sink_captures_batches() {
        let sink = MemorySink::new();
        sink.publish(&[record("a"), record("b")]).await.unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[0].trace_id(), "a");
    }

    #[tokio::test]
    async fn memory_sink_outage() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        assert!(sink.publish(&[record("a")]).await.is_err());
        assert!(sink.is_empty());

        sink.set_failing(false);
        sink.publish(&[record("a")]).await.unwrap();
        assert_eq!(sink.len(), 1);
    }
}
