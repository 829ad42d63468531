use thiserror::Error;

/// Errors from the telemetry pipeline's durable pieces.
///
/// Enqueueing never errors: a full queue drops the record and bumps a
/// counter instead, so enforcement is never coupled to telemetry health.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Spill file I/O failed.
    #[error("telemetry spill io error: {0}")]
    SpillIo(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("telemetry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
