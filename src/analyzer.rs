//! Query analyzer: runs a fixed battery of catalog queries through an
//! instrumented call wrapper and reports on size and latency.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::metrics::{json_size, reporter, AggregateStats, Instrumenter, MeasureError};
use crate::store::{Book, BookFilter, BookStore, Projection, StoreError};

/// Full-dataset size above which pagination is advised.
const PAGINATION_THRESHOLD_BYTES: u64 = 10_000;
/// Full-scan time above which indexes are advised.
const INDEX_THRESHOLD_MS: u64 = 100;

/// Outcome of one analyzed query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub operation: String,
    pub duration_ms: u64,
    pub size_bytes: u64,
    pub records: usize,
}

impl QueryReport {
    pub fn average_record_bytes(&self) -> Option<u64> {
        (self.records > 0).then(|| (self.size_bytes as f64 / self.records as f64).round() as u64)
    }
}

/// Dataset-wide figures drawn from the whole battery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_records: u64,
    pub full_dataset_bytes: u64,
    /// 0 for an empty catalog
    pub average_book_bytes: u64,
    pub fastest_query_ms: u64,
    pub smallest_response_bytes: u64,
    /// How much smaller the title-only projection is than the full scan,
    /// in whole percent. `None` when the projection returned nothing.
    pub projection_reduction_percent: Option<i64>,
}

impl Summary {
    fn from_queries(
        total_records: u64,
        full: &QueryReport,
        projected: &QueryReport,
        queries: &[QueryReport],
    ) -> Self {
        let average_book_bytes = if total_records == 0 {
            0
        } else {
            (full.size_bytes as f64 / total_records as f64).round() as u64
        };
        let projection_reduction_percent = (projected.records > 0 && full.size_bytes > 0).then(|| {
            ((1.0 - projected.size_bytes as f64 / full.size_bytes as f64) * 100.0).round() as i64
        });

        Self {
            total_records,
            full_dataset_bytes: full.size_bytes,
            average_book_bytes,
            fastest_query_ms: queries.iter().map(|q| q.duration_ms).min().unwrap_or(0),
            smallest_response_bytes: queries.iter().map(|q| q.size_bytes).min().unwrap_or(0),
            projection_reduction_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub queries: Vec<QueryReport>,
    pub summary: Summary,
    pub stats: AggregateStats,
    pub recommendations: Vec<&'static str>,
}

pub async fn run(store: Arc<dyn BookStore>, instrumenter: &Instrumenter) -> Result<Analysis, StoreError> {
    let all = BookFilter::default();
    let everything = Projection::all();
    let titles = Projection::parse("title");

    let full = find(instrumenter, "Find All Books", store.find(&all, &everything, 0, None)).await?;
    let by_status = find(
        instrumenter,
        "Find by Status",
        store.find(&BookFilter::by_status("Reading"), &everything, 0, None),
    )
    .await?;
    let (count, counted) = measure(
        instrumenter,
        "Count Books",
        store.count(&all),
        |n| json_size(&serde_json::json!({ "count": n })),
        |n| *n as usize,
    )
    .await?;
    let projected = find(
        instrumenter,
        "Find with Projection (title only)",
        store.find(&all, &titles, 0, None),
    )
    .await?;
    let limited = find(
        instrumenter,
        "Find with Limit (5 records)",
        store.find(&all, &everything, 0, Some(5)),
    )
    .await?;

    let queries = vec![full, by_status, counted, projected, limited];
    for q in &queries {
        info!(
            operation = %q.operation,
            duration_ms = q.duration_ms,
            size_bytes = q.size_bytes,
            records = q.records,
            average_record_bytes = ?q.average_record_bytes(),
            "query analyzed"
        );
    }

    let summary = Summary::from_queries(count, &queries[0], &queries[3], &queries);
    info!(
        total_records = summary.total_records,
        full_dataset_bytes = summary.full_dataset_bytes,
        average_book_bytes = summary.average_book_bytes,
        fastest_query_ms = summary.fastest_query_ms,
        smallest_response_bytes = summary.smallest_response_bytes,
        projection_reduction_percent = ?summary.projection_reduction_percent,
        "📈 summary"
    );

    let recommendations = recommend(&queries[0], &queries[3]);
    for r in &recommendations {
        info!("💡 {r}");
    }

    let stats = instrumenter.collector().snapshot();
    info!("\n{}", reporter::render(&stats));

    Ok(Analysis {
        queries,
        summary,
        stats,
        recommendations,
    })
}

async fn find<F>(instrumenter: &Instrumenter, operation: &str, call: F) -> Result<QueryReport, StoreError>
where
    F: Future<Output = Result<Vec<Book>, StoreError>>,
{
    let (_, report) = measure(instrumenter, operation, call, |books| json_size(books), Vec::len).await?;
    Ok(report)
}

/// Runs one query through the instrumenter. Time and size are taken from
/// this call alone, never read back from the shared collector.
async fn measure<T, F, S, R>(
    instrumenter: &Instrumenter,
    operation: &str,
    call: F,
    size_of: S,
    records_of: R,
) -> Result<(T, QueryReport), StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
    S: FnOnce(&T) -> Result<u64, MeasureError>,
    R: FnOnce(&T) -> usize,
{
    let mut size_bytes = 0;
    let start = Instant::now();
    let value = instrumenter
        .instrument_with(operation, call, |value: &T| {
            let size = size_of(value)?;
            size_bytes = size;
            Ok(size)
        })
        .await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let report = QueryReport {
        operation: operation.to_owned(),
        duration_ms,
        size_bytes,
        records: records_of(&value),
    };
    Ok((value, report))
}

/// Advice derived from the full scan and the projected scan.
pub fn recommend(full: &QueryReport, projected: &QueryReport) -> Vec<&'static str> {
    let mut out = Vec::new();
    if full.size_bytes > PAGINATION_THRESHOLD_BYTES {
        out.push("Consider pagination for large datasets");
    }
    if full.duration_ms > INDEX_THRESHOLD_MS {
        out.push("Consider adding indexes to frequently queried fields");
    }
    if (projected.size_bytes as f64) < full.size_bytes as f64 * 0.5 {
        out.push("Use projections to reduce response size");
    }
    out
}
