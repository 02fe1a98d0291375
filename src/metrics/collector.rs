use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::Sample;

// ─── Configuration ───────────────────────────────────────────────

/// How many individual call records we keep for the live feed
const MAX_RECENT_SAMPLES: usize = 50;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe running-statistics engine for one monitoring scope.
/// Instrumented calls push samples through `update()`, reporters read `snapshot()`.
pub struct MetricsCollector {
    scope: String,
    inner: Mutex<Inner>,
}

/// The slowest successful call seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowestCall {
    pub duration_ms: u64,
    pub operation: String,
}

/// The successful call with the largest payload seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargestPayload {
    pub size_bytes: u64,
    pub operation: String,
}

/// The most recent successful call, with its transfer rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastCall {
    pub operation: String,
    pub duration_ms: u64,
    pub payload_bytes: u64,
    /// 0 when the call finished under a millisecond
    pub bytes_per_sec: f64,
}

/// A single entry in the live call feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp_ms: u64,
    pub operation: String,
    pub duration_ms: u64,
    pub payload_bytes: u64,
    pub succeeded: bool,
}

/// Immutable copy of a collector's state.
///
/// With zero recorded calls both averages are `0.0` and the extrema are
/// `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub scope: String,

    // Counters
    pub total_calls: u64,
    pub total_errors: u64,
    pub total_duration_ms: u64,
    pub total_payload_bytes: u64,

    // Derived
    pub average_duration_ms: f64,
    pub average_payload_bytes: f64,
    pub calls_per_sec: f64,
    pub elapsed_secs: f64,

    // Attribution
    pub slowest_call: Option<SlowestCall>,
    pub largest_payload: Option<LargestPayload>,
    pub last_call: Option<LastCall>,

    pub recent_samples: Vec<SampleRecord>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    total_calls: u64,
    total_errors: u64,
    total_duration_ms: u64,
    total_payload_bytes: u64,

    average_duration_ms: f64,
    average_payload_bytes: f64,

    slowest_call: Option<SlowestCall>,
    largest_payload: Option<LargestPayload>,
    last_call: Option<LastCall>,

    // Rolling window of recent individual calls, failures included
    recent_samples: VecDeque<SampleRecord>,

    // Wall-clock anchor for elapsed time
    start_time: Option<Instant>,
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Fold one observation into the aggregate.
    ///
    /// Failed samples only bump the error counter. If a running total would
    /// overflow, the state can no longer be trusted: it is logged, wiped, and
    /// the sample is applied to the fresh state.
    pub fn update(&self, sample: Sample) {
        let mut inner = self.inner.lock();
        if !inner.can_absorb(&sample) {
            error!(
                scope = %self.scope,
                total_calls = inner.total_calls,
                total_errors = inner.total_errors,
                "metrics totals overflowed; resetting collector"
            );
            *inner = Inner::new();
        }
        inner.record(sample);
    }

    /// Wipe all data.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    /// Produce a consistent read-only copy of the current state.
    pub fn snapshot(&self) -> AggregateStats {
        self.inner.lock().snapshot(&self.scope)
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            total_calls: 0,
            total_errors: 0,
            total_duration_ms: 0,
            total_payload_bytes: 0,
            average_duration_ms: 0.0,
            average_payload_bytes: 0.0,
            slowest_call: None,
            largest_payload: None,
            last_call: None,
            recent_samples: VecDeque::with_capacity(MAX_RECENT_SAMPLES + 1),
            start_time: None,
        }
    }

    /// True when applying `sample` keeps every counter representable.
    fn can_absorb(&self, sample: &Sample) -> bool {
        if !sample.succeeded {
            return self.total_errors.checked_add(1).is_some();
        }
        self.total_calls.checked_add(1).is_some()
            && self.total_duration_ms.checked_add(sample.duration_ms).is_some()
            && self
                .total_payload_bytes
                .checked_add(sample.payload_bytes)
                .is_some()
    }

    fn record(&mut self, sample: Sample) {
        // Lazily set the anchor on the very first sample
        let start = *self.start_time.get_or_insert_with(Instant::now);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        self.push_recent(SampleRecord {
            timestamp_ms: elapsed_ms,
            operation: sample.operation.clone(),
            duration_ms: sample.duration_ms,
            payload_bytes: sample.payload_bytes,
            succeeded: sample.succeeded,
        });

        if !sample.succeeded {
            self.total_errors += 1;
            return;
        }

        // ── Totals and exact averages ───────────────────────────
        self.total_calls += 1;
        self.total_duration_ms += sample.duration_ms;
        self.total_payload_bytes += sample.payload_bytes;
        self.average_duration_ms = self.total_duration_ms as f64 / self.total_calls as f64;
        self.average_payload_bytes = self.total_payload_bytes as f64 / self.total_calls as f64;

        // ── Extrema: strict improvement only, first seen keeps ties ─
        let slower = self
            .slowest_call
            .as_ref()
            .map_or(true, |s| sample.duration_ms > s.duration_ms);
        if slower {
            self.slowest_call = Some(SlowestCall {
                duration_ms: sample.duration_ms,
                operation: sample.operation.clone(),
            });
        }

        let larger = self
            .largest_payload
            .as_ref()
            .map_or(true, |l| sample.payload_bytes > l.size_bytes);
        if larger {
            self.largest_payload = Some(LargestPayload {
                size_bytes: sample.payload_bytes,
                operation: sample.operation.clone(),
            });
        }

        let bytes_per_sec = if sample.duration_ms > 0 {
            sample.payload_bytes as f64 / (sample.duration_ms as f64 / 1000.0)
        } else {
            0.0
        };
        self.last_call = Some(LastCall {
            operation: sample.operation,
            duration_ms: sample.duration_ms,
            payload_bytes: sample.payload_bytes,
            bytes_per_sec,
        });
    }

    fn push_recent(&mut self, record: SampleRecord) {
        self.recent_samples.push_back(record);
        if self.recent_samples.len() > MAX_RECENT_SAMPLES {
            self.recent_samples.pop_front();
        }
    }

    fn snapshot(&self, scope: &str) -> AggregateStats {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let calls_per_sec = if elapsed_secs > 0.0 {
            self.total_calls as f64 / elapsed_secs
        } else {
            0.0
        };

        AggregateStats {
            scope: scope.to_owned(),
            total_calls: self.total_calls,
            total_errors: self.total_errors,
            total_duration_ms: self.total_duration_ms,
            total_payload_bytes: self.total_payload_bytes,
            average_duration_ms: self.average_duration_ms,
            average_payload_bytes: self.average_payload_bytes,
            calls_per_sec,
            elapsed_secs,
            slowest_call: self.slowest_call.clone(),
            largest_payload: self.largest_payload.clone(),
            last_call: self.last_call.clone(),
            recent_samples: self.recent_samples.iter().cloned().collect(),
        }
    }
}
