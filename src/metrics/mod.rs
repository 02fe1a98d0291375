pub mod collector;
pub mod instrument;
pub mod reporter;
pub mod stream;

pub use collector::{AggregateStats, MetricsCollector};
pub use instrument::{json_size, Instrumenter, MeasureError};

/// A single observation produced by one wrapped call.
/// Built by the instrumenter and pushed into a collector.
#[derive(Debug, Clone)]
pub struct Sample {
    /// e.g. "GET /books", "Find by Status"
    pub operation: String,
    /// Wall-clock time of the call in milliseconds
    pub duration_ms: u64,
    /// Serialized size of the result (or response body) in bytes
    pub payload_bytes: u64,
    /// false when the call returned an error or was cancelled
    pub succeeded: bool,
}

impl Sample {
    pub fn success(operation: impl Into<String>, duration_ms: u64, payload_bytes: u64) -> Self {
        Self {
            operation: operation.into(),
            duration_ms,
            payload_bytes,
            succeeded: true,
        }
    }

    pub fn failure(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            operation: operation.into(),
            duration_ms,
            payload_bytes: 0,
            succeeded: false,
        }
    }
}
