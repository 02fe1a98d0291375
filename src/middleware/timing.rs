use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{response::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::metrics::MeasureError;
use crate::AppState;

/// Paths served without measurement: the metrics endpoints themselves, and
/// the SSE stream whose body never ends.
const UNMEASURED_PREFIX: &str = "/api/metrics";

/// A handler response whose body has been read into memory once, so it can
/// be sized and then sent on unchanged.
#[derive(Debug)]
struct Buffered {
    parts: Parts,
    body: Bytes,
}

impl Buffered {
    fn into_response(self) -> Response {
        Response::from_parts(self.parts, Body::from(self.body))
    }
}

#[derive(Debug, thiserror::Error)]
enum RequestFailure {
    #[error("responded with status {}", .0.parts.status)]
    Status(Buffered),
    #[error("response body failed: {0}")]
    Body(String),
}

/// Middleware that measures every request into the `http` scope and adds
/// three response headers:
///
///   X-Response-Time-Ms: total handler wall time in milliseconds
///   Server-Timing: same value in the standard Server-Timing format
///   X-Response-Size: body size in bytes
///
/// Non-2xx responses count as failed calls but are passed through as-is.
pub async fn timing_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    if path.starts_with(UNMEASURED_PREFIX) {
        return next.run(req).await;
    }

    let operation = format!("{method} {path}");
    let start = Instant::now();

    let outcome = state
        .http
        .instrument_with(
            &operation,
            async move {
                let response = next.run(req).await;
                let (parts, body) = response.into_parts();
                let body = axum::body::to_bytes(body, usize::MAX)
                    .await
                    .map_err(|e| RequestFailure::Body(e.to_string()))?;
                let buffered = Buffered { parts, body };
                if buffered.parts.status.is_success() {
                    Ok::<_, RequestFailure>(buffered)
                } else {
                    Err(RequestFailure::Status(buffered))
                }
            },
            |r: &Buffered| Ok::<_, MeasureError>(r.body.len() as u64),
        )
        .await;

    let elapsed = start.elapsed();
    let ms = elapsed.as_millis();

    let buffered = match outcome {
        Ok(b) | Err(RequestFailure::Status(b)) => b,
        Err(RequestFailure::Body(msg)) => {
            error!(%method, %path, error = %msg, "handler body could not be read");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let status = buffered.parts.status.as_u16();
    let size = buffered.body.len();
    let mut response = buffered.into_response();

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = ms.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Ms", val);
    }
    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }
    if let Ok(val) = size.to_string().parse() {
        response.headers_mut().insert("X-Response-Size", val);
    }

    info!(%method, %path, status, duration_ms = ms as u64, size_bytes = size, "request");

    response
}
