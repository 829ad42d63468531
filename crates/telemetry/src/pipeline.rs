use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::record::TelemetryRecord;
use crate::sink::TelemetrySink;
use crate::spill::SpillStore;

/// Telemetry pipeline configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Bounded queue capacity between the request path and the worker.
    pub queue_capacity: usize,
    /// Maximum records per batch POSTed to the sink.
    pub batch_size: usize,
    /// Maximum time a partial batch waits before being flushed.
    pub batch_interval: Duration,
    /// Path of the NDJSON spill file.
    pub spill_path: PathBuf,
    /// Size bound triggering spill rotation.
    pub spill_max_bytes: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            batch_size: 100,
            batch_interval: Duration::from_secs(5),
            spill_path: PathBuf::from("warden-telemetry.ndjson"),
            spill_max_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Cheap-to-clone producer handle held by the enforcement pipeline.
///
/// Enqueueing never blocks and never errors: a full queue drops the record
/// and increments the drop counter. Every record is also fanned out on a
/// broadcast channel feeding the live SSE stream.
#[derive(Clone)]
pub struct TelemetryHandle {
    tx: mpsc::Sender<TelemetryRecord>,
    dropped: Arc<AtomicU64>,
    stream_tx: broadcast::Sender<TelemetryRecord>,
}

impl TelemetryHandle {
    /// Create a handle and its consumer end without spawning a worker.
    /// Used by [`TelemetryPipeline::start`] and by tests that need a paused
    /// worker.
    pub fn channel(queue_capacity: usize) -> (Self, mpsc::Receiver<TelemetryRecord>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let (stream_tx, _) = broadcast::channel(256);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
                stream_tx,
            },
            rx,
        )
    }

    /// Enqueue a record. Non-blocking; drops on a full queue.
    pub fn record(&self, record: TelemetryRecord) {
        // Stream subscribers are best-effort; send fails only when nobody is
        // listening.
        let _ = self.stream_tx.send(record.clone());

        if self.tx.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of records dropped due to a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Subscribe to the live record stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryRecord> {
        self.stream_tx.subscribe()
    }
}

impl std::fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryHandle")
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

/// The telemetry pipeline: bounded queue, single background worker, batched
/// sink publication, spill-and-replay on sink failure.
///
/// Started last and stopped first relative to the enforcement pipeline so
/// shutdown can drain in-flight records.
pub struct TelemetryPipeline {
    handle: TelemetryHandle,
    worker: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl TelemetryPipeline {
    /// Start the pipeline and its background worker.
    pub fn start(config: TelemetryConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        let (handle, rx) = TelemetryHandle::channel(config.queue_capacity);
        let shutdown = CancellationToken::new();
        let spill = SpillStore::new(config.spill_path.clone(), config.spill_max_bytes);

        let worker = tokio::spawn(run_worker(config, sink, spill, rx, shutdown.clone()));

        Self {
            handle,
            worker,
            shutdown,
        }
    }

    /// Producer handle for the enforcement pipeline and admin surface.
    pub fn handle(&self) -> TelemetryHandle {
        self.handle.clone()
    }

    /// Stop the worker, draining queued records first.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.worker.await {
            warn!(error = %e, "telemetry worker did not shut down cleanly");
        }
    }
}

async fn run_worker(
    config: TelemetryConfig,
    sink: Arc<dyn TelemetrySink>,
    spill: SpillStore,
    mut rx: mpsc::Receiver<TelemetryRecord>,
    shutdown: CancellationToken,
) {
    let mut buffer: Vec<TelemetryRecord> = Vec::with_capacity(config.batch_size);
    let mut interval = tokio::time::interval(config.batch_interval);
    // The first tick completes immediately; skip it.
    interval.tick().await;

    info!(
        batch_size = config.batch_size,
        interval = ?config.batch_interval,
        "telemetry worker started"
    );

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                while let Ok(record) = rx.try_recv() {
                    buffer.push(record);
                }
                flush(&sink, &spill, &mut buffer, config.batch_size).await;
                info!("telemetry worker stopped");
                return;
            }
            received = rx.recv() => {
                match received {
                    Some(record) => {
                        buffer.push(record);
                        if buffer.len() >= config.batch_size {
                            flush(&sink, &spill, &mut buffer, config.batch_size).await;
                        }
                    }
                    None => {
                        flush(&sink, &spill, &mut buffer, config.batch_size).await;
                        info!("telemetry producers gone, worker stopping");
                        return;
                    }
                }
            }
            _ = interval.tick() => {
                if !buffer.is_empty() || spill.has_spilled() {
                    flush(&sink, &spill, &mut buffer, config.batch_size).await;
                }
            }
        }
    }
}

/// Publish the buffer; on sink failure spill it. After a successful publish,
/// replay any spilled backlog.
async fn flush(
    sink: &Arc<dyn TelemetrySink>,
    spill: &SpillStore,
    buffer: &mut Vec<TelemetryRecord>,
    batch_size: usize,
) {
    if !buffer.is_empty() {
        match sink.publish(buffer).await {
            Ok(()) => {
                debug!(records = buffer.len(), "telemetry batch published");
                buffer.clear();
            }
            Err(e) => {
                warn!(error = %e, records = buffer.len(), "telemetry sink failed, spilling batch");
                if let Err(spill_err) = spill.append(buffer) {
                    warn!(error = %spill_err, "telemetry spill failed, dropping batch");
                }
                buffer.clear();
                return;
            }
        }
    }

    if spill.has_spilled() {
        replay(sink, spill, batch_size).await;
    }
}

/// Replay spilled records in batches; anything the sink still rejects goes
/// back to the spill.
async fn replay(sink: &Arc<dyn TelemetrySink>, spill: &SpillStore, batch_size: usize) {
    let backlog = match spill.drain() {
        Ok(backlog) => backlog,
        Err(e) => {
            warn!(error = %e, "failed to drain telemetry spill");
            return;
        }
    };
    if backlog.is_empty() {
        return;
    }

    let step = batch_size.max(1);
    let mut offset = 0;
    while offset < backlog.len() {
        let end = (offset + step).min(backlog.len());
        if let Err(e) = sink.publish(&backlog[offset..end]).await {
            warn!(error = %e, "telemetry replay interrupted, re-spilling remainder");
            if let Err(spill_err) = spill.append(&backlog[offset..]) {
                warn!(error = %spill_err, "telemetry re-spill failed, dropping remainder");
            }
            return;
        }
        offset = end;
    }
    info!(records = backlog.len(), "replayed spilled telemetry records");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RequestRecord;
    use crate::sink::MemorySink;
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

    fn config(spill_tag: &str) -> TelemetryConfig {
        let dir = std::env::temp_dir().join(format!(
            "warden-telemetry-{spill_tag}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        TelemetryConfig {
            queue_capacity: 1024,
            batch_size: 10,
            batch_interval: Duration::from_millis(50),
            spill_path: dir.join("spill.ndjson"),
            spill_max_bytes: 1 << 20,
        }
    }

    #[tokio::test]
    async fn batches_reach_the_sink() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = TelemetryPipeline::start(config("batch"), Arc::clone(&sink) as _);
        let handle = pipeline.handle();

        for i in 0..25 {
            handle.record(record(&format!("trace-{i}")));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.len(), 25);
        assert_eq!(handle.dropped(), 0);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        // No worker: the queue fills up and stays full.
        let (handle, _rx) = TelemetryHandle::channel(10);

        let start = std::time::Instant::now();
        for i in 0..100 {
            handle.record(record(&format!("trace-{i}")));
        }
        // Non-blocking enqueue of 100 records against capacity 10.
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(handle.dropped(), 90);
    }

    #[tokio::test]
    async fn sink_outage_spills_and_replays() {
        let sink = Arc::new(MemorySink::new());
        sink.set_failing(true);

        let pipeline = TelemetryPipeline::start(config("spill"), Arc::clone(&sink) as _);
        let handle = pipeline.handle();

        for i in 0..5 {
            handle.record(record(&format!("trace-{i}")));
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(sink.is_empty());

        // Sink recovers: the next interval replays the spilled backlog.
        sink.set_failing(false);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.len(), 5);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_pending_records() {
        let sink = Arc::new(MemorySink::new());
        let mut cfg = config("drain");
        cfg.batch_interval = Duration::from_secs(3600);
        let pipeline = TelemetryPipeline::start(cfg, Arc::clone(&sink) as _);
        let handle = pipeline.handle();

        for i in 0..3 {
            handle.record(record(&format!("trace-{i}")));
        }
        pipeline.shutdown().await;
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn stream_subscribers_see_records() {
        let (handle, _rx) = TelemetryHandle::channel(16);
        let mut stream = handle.subscribe();

        handle.record(record("live-1"));
        let received = stream.recv().await.unwrap();
        assert_eq!(received.trace_id(), "live-1");
    }

    #[tokio::test]
    async fn exactly_one_request_record_per_recorded_request() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = TelemetryPipeline::start(config("exact"), Arc::clone(&sink) as _);
        let handle = pipeline.handle();

        handle.record(record("unique-trace"));
        tokio::time::sleep(Duration::from_millis(150)).await;

        let matching: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|r| r.trace_id() == "unique-trace")
            .collect();
        assert_eq!(matching.len(), 1);

        pipeline.shutdown().await;
    }
}
