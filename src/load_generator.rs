use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tracing::{error, info};

use crate::client::{CatalogClient, ClientError};
use crate::mock_data;
use crate::store::NewBook;

// ─── Public types ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PerfOptions {
    /// Number of simultaneous list requests in the concurrency phase
    pub concurrency: usize,
    /// Number of books inserted in the large dataset phase
    pub batch: usize,
}

/// Result of one phase of the run.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub name: &'static str,
    pub elapsed_ms: u64,
    /// Response bytes the client measured during the phase
    pub bytes: u64,
    pub succeeded: bool,
}

// ─── Public entry point ──────────────────────────────────────────

/// Drives the API through `client` phase by phase. A failing phase is
/// logged and the run moves on to the next one.
pub async fn run(client: &CatalogClient, opts: &PerfOptions) -> Vec<PhaseResult> {
    let mut results = Vec::with_capacity(4);

    results.push(
        phase(client, "single list", async {
            let page = client.list_books(1, 10).await?;
            info!(books = page.books.len(), total = page.total, "listed books");
            Ok::<(), ClientError>(())
        })
        .await,
    );

    results.push(
        phase(client, "single insert", async {
            let book = client.add_book(&test_book()).await?;
            info!(id = %book.id, "inserted test book");
            Ok::<(), ClientError>(())
        })
        .await,
    );

    results.push(phase(client, "concurrent list", concurrent_lists(client, opts.concurrency)).await);

    results.push(phase(client, "large dataset", large_dataset(client, opts.batch)).await);

    results
}

// ─── Phases ──────────────────────────────────────────────────────

async fn phase<F>(client: &CatalogClient, name: &'static str, work: F) -> PhaseResult
where
    F: Future<Output = Result<(), ClientError>>,
{
    let collector = client.instrumenter().collector();
    let bytes_before = collector.snapshot().total_payload_bytes;
    let start = Instant::now();

    let outcome = work.await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let bytes = collector
        .snapshot()
        .total_payload_bytes
        .saturating_sub(bytes_before);

    match &outcome {
        Ok(()) => info!(phase = name, elapsed_ms, bytes, "✅ phase complete"),
        Err(e) => error!(phase = name, elapsed_ms, error = %e, "❌ phase failed"),
    }

    PhaseResult {
        name,
        elapsed_ms,
        bytes,
        succeeded: outcome.is_ok(),
    }
}

async fn concurrent_lists(client: &CatalogClient, concurrency: usize) -> Result<(), ClientError> {
    let mut handles = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.list_books(1, 10).await }));
    }

    // Wait for all requests before reporting the first failure
    let mut first_err = None;
    for h in handles {
        match h.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                first_err.get_or_insert(e);
            }
            Err(join) => error!(error = %join, "list task panicked"),
        }
    }
    first_err.map_or(Ok(()), Err)
}

async fn large_dataset(client: &CatalogClient, batch: usize) -> Result<(), ClientError> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut handles = Vec::with_capacity(batch);

    for i in 0..batch {
        let mut book = mock_data::random_book(&mut rng);
        book.title = format!("Large Dataset Book {}", i + 1);
        book.description = book.description.repeat(10);
        book.status = if i % 2 == 0 { "Reading" } else { "Completed" }.into();

        let client = client.clone();
        handles.push(tokio::spawn(async move { client.add_book(&book).await }));
    }

    let mut inserted = 0;
    for h in handles {
        if let Ok(Ok(_)) = h.await {
            inserted += 1;
        }
    }
    info!(inserted, requested = batch, "inserted large dataset");

    let page = client.list_books(1, 100).await?;
    info!(books = page.books.len(), total = page.total, "retrieved large dataset");
    Ok(())
}

fn test_book() -> NewBook {
    NewBook {
        title: format!("Test Book {}", chrono::Utc::now().timestamp_millis()),
        author: "Performance Tester".into(),
        description: "This is a test book for performance testing with detailed metrics \
                      and response size analysis"
            .into(),
        status: "Reading".into(),
    }
}
