use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

mod analyzer;
mod args;
mod client;
mod config;
mod handlers;
mod load_generator;
mod logging;
mod metrics;
mod middleware;
mod mock_data;
mod server;
mod store;

use args::{Args, Command};
use config::{Config, StoreBackend};
use metrics::{reporter, Instrumenter, MetricsCollector};
use store::{BookStore, InstrumentedStore, MemoryBookStore, RedisBookStore};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Catalog storage; every call is measured into `queries`.
    pub store: Arc<dyn BookStore>,

    /// Measures inbound HTTP requests (the `http` scope).
    pub http: Instrumenter,

    /// Collector behind `store` (the `queries` scope).
    pub queries: Arc<MetricsCollector>,
}

impl AppState {
    /// Wraps `backend` for measurement and creates both server-side scopes.
    pub fn new(backend: Arc<dyn BookStore>) -> Arc<Self> {
        let queries = Arc::new(MetricsCollector::new("queries"));
        let store = InstrumentedStore::new(backend, Instrumenter::new(queries.clone()));
        Arc::new(Self {
            store: Arc::new(store),
            http: Instrumenter::new(Arc::new(MetricsCollector::new("http"))),
            queries,
        })
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.logging);

    let result = match args.subcommand() {
        Command::Serve => serve(config).await,
        Command::Analyze => analyze(config).await,
        Command::PerfTest {
            base_url,
            concurrency,
            batch,
        } => perf_test(config, base_url, concurrency, batch).await,
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn BookStore>> {
    let store: Arc<dyn BookStore> = match config.store {
        StoreBackend::Redis => Arc::new(
            RedisBookStore::connect(&config.redis_url)
                .await
                .with_context(|| format!("cannot connect to redis at {}", config.redis_url))?,
        ),
        StoreBackend::Memory => Arc::new(MemoryBookStore::new()),
    };

    if config.seed {
        mock_data::seed(store.as_ref(), mock_data::SEED_BOOKS)
            .await
            .context("seeding sample books")?;
    }
    Ok(store)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let backend = open_store(&config).await?;
    let state = AppState::new(backend);

    // ── Periodic reports, stopped on shutdown ───────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut reporters = Vec::new();
    if config.report_interval_secs > 0 {
        let every = Duration::from_secs(config.report_interval_secs);
        for collector in [state.http.collector().clone(), state.queries.clone()] {
            reporters.push(reporter::spawn_periodic(collector, every, shutdown_rx.clone()));
        }
    }

    let app = server::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("🚀 listening on http://{addr}");
    info!("metrics JSON → http://{addr}/api/metrics");
    info!("metrics SSE  → http://{addr}/api/metrics/stream");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server exited with error")?;

    let _ = shutdown_tx.send(true);
    for handle in reporters {
        let _ = handle.await;
    }

    info!("\n{}", reporter::render(&state.http.collector().snapshot()));
    info!("\n{}", reporter::render(&state.queries.snapshot()));
    Ok(())
}

async fn analyze(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let instrumenter = Instrumenter::new(Arc::new(MetricsCollector::new("analyzer")));
    analyzer::run(store, &instrumenter)
        .await
        .context("query analysis failed")?;
    Ok(())
}

/// The client monitor ticks once a second regardless of
/// `report_interval_secs`, which only switches it off when 0.
const CLIENT_MONITOR_EVERY: Duration = Duration::from_secs(1);

fn client_monitor_interval(config: &Config) -> Option<Duration> {
    (config.report_interval_secs > 0).then_some(CLIENT_MONITOR_EVERY)
}

async fn perf_test(
    config: Config,
    base_url: String,
    concurrency: usize,
    batch: usize,
) -> anyhow::Result<()> {
    let collector = Arc::new(MetricsCollector::new("client"));
    let client = client::CatalogClient::new(base_url, Instrumenter::new(collector.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = client_monitor_interval(&config)
        .map(|every| reporter::spawn_periodic(collector.clone(), every, shutdown_rx));

    info!("🚀 starting performance run");
    let results = load_generator::run(
        &client,
        &load_generator::PerfOptions { concurrency, batch },
    )
    .await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = monitor {
        let _ = handle.await;
    }

    info!("\n{}", reporter::render(&collector.snapshot()));
    let failed = results.iter().filter(|r| !r.succeeded).count();
    info!(phases = results.len(), failed, "🎯 performance run completed");
    Ok(())
}
