pub mod error;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod spill;

pub use error::TelemetryError;
pub use pipeline::{TelemetryConfig, TelemetryHandle, TelemetryPipeline};
pub use record::{RequestRecord, TelemetryRecord, ViolationRecord};
pub use sink::{DiscardSink, HttpSink, MemorySink, SinkError, TelemetrySink};
pub use spill::SpillStore;
