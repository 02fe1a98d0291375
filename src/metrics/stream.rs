use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::collector::AggregateStats;
use crate::AppState;

/// Both server-side scopes in one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMetrics {
    /// Inbound HTTP requests, fed by the timing middleware
    pub http: AggregateStats,
    /// Storage queries, fed by the instrumented store
    pub queries: AggregateStats,
}

impl ServerMetrics {
    pub fn capture(state: &AppState) -> Self {
        Self {
            http: state.http.collector().snapshot(),
            queries: state.queries.snapshot(),
        }
    }
}

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns a single JSON snapshot of both server scopes.

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<ServerMetrics> {
    Json(ServerMetrics::capture(&state))
}

// ─── POST /api/metrics/reset ─────────────────────────────────────

pub async fn reset_metrics(State(state): State<Arc<AppState>>) -> Json<ServerMetrics> {
    state.http.collector().reset();
    state.queries.reset();
    Json(ServerMetrics::capture(&state))
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a full `ServerMetrics` as JSON every 500 ms.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = ServerMetrics::capture(&state);
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
