use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::{AggregateStats, MetricsCollector};

/// Renders collector snapshots for humans.
///
/// The only state kept is the last rendered text, so a periodic loop can
/// skip logging when nothing changed.
#[derive(Debug, Default)]
pub struct Reporter {
    last_rendered: Option<String>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_rendered(&self) -> Option<&str> {
        self.last_rendered.as_deref()
    }

    /// Renders the collector's current state. Returns the text only when it
    /// differs from the previous render.
    pub fn report(&mut self, collector: &MetricsCollector) -> Option<&str> {
        let text = render(&collector.snapshot());
        if self.last_rendered.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last_rendered = Some(text);
        self.last_rendered.as_deref()
    }
}

/// Multi-line summary of a snapshot.
pub fn render(stats: &AggregateStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📈 Overall {} metrics:", stats.scope);
    let _ = writeln!(out, "   - Total Calls: {}", stats.total_calls);
    let _ = writeln!(out, "   - Failed Calls: {}", stats.total_errors);
    let _ = writeln!(
        out,
        "   - Total Payload: {}",
        format_bytes(stats.total_payload_bytes)
    );
    let _ = writeln!(
        out,
        "   - Average Payload: {}",
        format_bytes(stats.average_payload_bytes.round() as u64)
    );
    let _ = writeln!(
        out,
        "   - Average Duration: {:.2}ms",
        stats.average_duration_ms
    );

    match &stats.slowest_call {
        Some(s) => {
            let _ = writeln!(out, "   - Slowest Call: {} ({}ms)", s.operation, s.duration_ms);
        }
        None => {
            let _ = writeln!(out, "   - Slowest Call: n/a");
        }
    }
    match &stats.largest_payload {
        Some(l) => {
            let _ = write!(
                out,
                "   - Largest Payload: {} ({})",
                l.operation,
                format_bytes(l.size_bytes)
            );
        }
        None => {
            let _ = write!(out, "   - Largest Payload: n/a");
        }
    }
    if let Some(last) = &stats.last_call {
        let _ = write!(
            out,
            "\n   - Last Call: {} ({}, {}ms, {}/s)",
            last.operation,
            format_bytes(last.payload_bytes),
            last.duration_ms,
            format_bytes(last.bytes_per_sec.round() as u64)
        );
    }
    out
}

/// Human-readable byte count: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2.25 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

/// Logs the collector's report every `every` until `shutdown` flips to true
/// or its sender is dropped.
pub fn spawn_periodic(
    collector: Arc<MetricsCollector>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<Reporter> {
    tokio::spawn(async move {
        let mut reporter = Reporter::new();
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(text) = reporter.report(&collector) {
                        info!(scope = collector.scope(), "\n{text}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        reporter
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Sample;

    #[test]
    fn formats_bytes_like_the_dashboard() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 / 2), "2.5 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3 GB");
        // Saturates at GB
        assert_eq!(format_bytes(2048 * 1024 * 1024 * 1024), "2048 GB");
    }

    #[test]
    fn empty_collector_renders_placeholders() {
        let text = render(&MetricsCollector::new("client").snapshot());
        assert!(text.contains("Overall client metrics"));
        assert!(text.contains("Total Calls: 0"));
        assert!(text.contains("Average Payload: 0 Bytes"));
        assert!(text.contains("Average Duration: 0.00ms"));
        assert!(text.contains("Slowest Call: n/a"));
        assert!(text.contains("Largest Payload: n/a"));
        assert!(!text.contains("Last Call"));
    }

    #[test]
    fn renders_attribution() {
        let c = MetricsCollector::new("queries");
        c.update(Sample::success("A", 100, 500));
        c.update(Sample::success("B", 50, 2000));
        c.update(Sample::success("C", 300, 100));

        let text = render(&c.snapshot());
        assert!(text.contains("Total Calls: 3"));
        assert!(text.contains("Average Duration: 150.00ms"));
        assert!(text.contains("Average Payload: 867 Bytes"));
        assert!(text.contains("Slowest Call: C (300ms)"));
        assert!(text.contains("Largest Payload: B (1.95 KB)"));
        assert!(text.contains("Last Call: C (100 Bytes, 300ms, 333 Bytes/s)"));
    }

    #[test]
    fn report_skips_unchanged_state_and_never_mutates() {
        let c = MetricsCollector::new("http");
        let mut reporter = Reporter::new();

        assert!(reporter.report(&c).is_some());
        assert!(reporter.report(&c).is_none());

        c.update(Sample::success("GET /books", 4, 40));
        let text = reporter.report(&c).map(str::to_owned).unwrap();
        assert!(text.contains("Total Calls: 1"));
        assert_eq!(reporter.last_rendered(), Some(text.as_str()));
        assert_eq!(c.snapshot().total_calls, 1);
    }

    #[tokio::test]
    async fn periodic_reporter_stops_on_shutdown() {
        let c = Arc::new(MetricsCollector::new("client"));
        c.update(Sample::success("GET /books", 1, 1));
        let (tx, rx) = watch::channel(false);

        let handle = spawn_periodic(c, Duration::from_millis(5), rx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let reporter = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reporter did not stop")
            .unwrap();
        assert!(reporter.last_rendered().unwrap().contains("Total Calls: 1"));
    }

    #[tokio::test]
    async fn periodic_reporter_stops_when_sender_dropped() {
        let c = Arc::new(MetricsCollector::new("client"));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_periodic(c, Duration::from_millis(5), rx);
        drop(tx);

        let finished = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(finished.is_ok());
    }
}
