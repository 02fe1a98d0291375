use std::fmt::Display;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use super::{MetricsCollector, Sample};

/// Sizing a successful result failed. The call itself still succeeded.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error("result could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Wraps async calls, timing and sizing each one and feeding the owning
/// collector. Cheap to clone; every clone feeds the same collector.
#[derive(Clone)]
pub struct Instrumenter {
    collector: Arc<MetricsCollector>,
}

impl Instrumenter {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Runs `call`, sizing its `Ok` value by its JSON encoding.
    pub async fn instrument<T, E, F>(&self, operation: &str, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        self.instrument_with(operation, call, json_size).await
    }

    /// Runs `call` and measures it with a caller-supplied sizer.
    ///
    /// The sizer only borrows the value, so the caller always receives the
    /// original result. Errors are handed back untouched. If the returned
    /// future is dropped before `call` finishes, a failed sample is recorded.
    pub async fn instrument_with<T, E, F, S>(
        &self,
        operation: &str,
        call: F,
        size_of: S,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        S: FnOnce(&T) -> Result<u64, MeasureError>,
        E: Display,
    {
        let mut in_flight = InFlight::start(&self.collector, operation);
        let outcome = call.await;
        let duration_ms = in_flight.finish();

        match outcome {
            Ok(value) => {
                let payload_bytes = size_of(&value).unwrap_or_else(|e| {
                    warn!(
                        scope = self.collector.scope(),
                        operation,
                        error = %e,
                        "could not measure result size; recording 0 bytes"
                    );
                    0
                });
                debug!(
                    scope = self.collector.scope(),
                    operation, duration_ms, payload_bytes, "call completed"
                );
                self.collector
                    .update(Sample::success(operation, duration_ms, payload_bytes));
                Ok(value)
            }
            Err(err) => {
                warn!(
                    scope = self.collector.scope(),
                    operation,
                    duration_ms,
                    error = %err,
                    "call failed"
                );
                self.collector.update(Sample::failure(operation, duration_ms));
                Err(err)
            }
        }
    }
}

// ─── Cancellation guard ──────────────────────────────────────────

/// Records a failed sample if dropped while the call is still pending.
struct InFlight<'a> {
    collector: &'a MetricsCollector,
    operation: &'a str,
    start: Instant,
    pending: bool,
}

impl<'a> InFlight<'a> {
    fn start(collector: &'a MetricsCollector, operation: &'a str) -> Self {
        Self {
            collector,
            operation,
            start: Instant::now(),
            pending: true,
        }
    }

    fn finish(&mut self) -> u64 {
        self.pending = false;
        elapsed_ms(self.start)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.pending {
            let duration_ms = elapsed_ms(self.start);
            warn!(
                scope = self.collector.scope(),
                operation = self.operation,
                duration_ms,
                "call cancelled"
            );
            self.collector
                .update(Sample::failure(self.operation, duration_ms));
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// ─── Sizing ──────────────────────────────────────────────────────

/// Length in bytes of `value`'s JSON encoding, without buffering it.
pub fn json_size<T: Serialize + ?Sized>(value: &T) -> Result<u64, MeasureError> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.0)
}

struct ByteCounter(u64);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
