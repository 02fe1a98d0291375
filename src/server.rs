use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Catalog endpoints ───────────────────────────────────
        .route("/health", get(handlers::health::health))
        .route(
            "/books",
            get(handlers::books::list_books).post(handlers::books::create_book),
        )
        .route("/books/:id", get(handlers::books::get_book))
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/reset", post(stream::reset_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            timing::timing_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BookStore, MemoryBookStore, NewBook};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn seeded_state(n: usize) -> Arc<AppState> {
        let store = Arc::new(MemoryBookStore::new());
        for i in 0..n {
            store
                .insert(NewBook {
                    title: format!("Book {i}"),
                    author: "Tester".into(),
                    description: "A book used in tests".into(),
                    status: if i % 2 == 0 { "Reading" } else { "Completed" }.into(),
                })
                .await
                .unwrap();
        }
        AppState::new(store)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = create_router(seeded_state(0).await);
        let (status, _, body) = send(app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], "OK");
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn lists_pages_with_projection() {
        let state = seeded_state(15).await;
        let app = create_router(state.clone());

        let (status, _, body) =
            send(app, get_req("/books?page=2&limit=10&fields=title")).await;
        assert_eq!(status, StatusCode::OK);

        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["total"], 15);
        assert_eq!(v["page"], 2);
        let books = v["books"].as_array().unwrap();
        assert_eq!(books.len(), 5);
        assert_eq!(books[0]["title"], "Book 10");
        assert!(books[0].get("author").is_none());
        assert!(books[0]["id"].is_string());

        // One find and one count went through the instrumented store
        let q = state.queries.snapshot();
        assert_eq!(q.total_calls, 2);
    }

    #[tokio::test]
    async fn filters_by_status() {
        let app = create_router(seeded_state(6).await);
        let (_, _, body) = send(app, get_req("/books?status=Completed&limit=100")).await;
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["total"], 3);
        assert_eq!(v["books"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_zero_page() {
        let state = seeded_state(1).await;
        let app = create_router(state.clone());
        let (status, _, body) = send(app, get_req("/books?page=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], 400);

        let http = state.http.collector().snapshot();
        assert_eq!(http.total_calls, 0);
        assert_eq!(http.total_errors, 1);
    }

    #[tokio::test]
    async fn creates_then_views_a_book() {
        let state = seeded_state(0).await;

        let (status, _, body) = send(
            create_router(state.clone()),
            post_json(
                "/books",
                json!({"title": "Emma", "author": "Jane Austen", "status": "Reading"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Value = serde_json::from_slice(&body).unwrap();
        let id = created["id"].as_str().unwrap().to_owned();
        assert_eq!(created["description"], "");

        let (status, _, body) =
            send(create_router(state.clone()), get_req(&format!("/books/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let fetched: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let app = create_router(seeded_state(0).await);
        let (status, _, _) = send(app, post_json("/books", json!({"title": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_book_is_404() {
        let app = create_router(seeded_state(2).await);
        let (status, _, body) = send(app, get_req("/books/bk_nothere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["error"], "book 'bk_nothere' not found");
    }

    #[tokio::test]
    async fn middleware_measures_without_altering_body() {
        let state = seeded_state(3).await;
        let (status, headers, body) =
            send(create_router(state.clone()), get_req("/books")).await;
        assert_eq!(status, StatusCode::OK);

        let size: usize = headers["x-response-size"].to_str().unwrap().parse().unwrap();
        assert_eq!(size, body.len());
        assert!(headers.contains_key("x-response-time-ms"));
        assert!(headers["server-timing"].to_str().unwrap().starts_with("total;dur="));

        let http = state.http.collector().snapshot();
        assert_eq!(http.total_calls, 1);
        assert_eq!(http.total_payload_bytes, body.len() as u64);
        assert_eq!(http.slowest_call.unwrap().operation, "GET /books");
    }

    #[tokio::test]
    async fn metrics_endpoints_are_not_measured() {
        let state = seeded_state(1).await;
        send(create_router(state.clone()), get_req("/books")).await;

        let (status, _, body) = send(create_router(state.clone()), get_req("/api/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["http"]["total_calls"], 1);
        assert_eq!(v["http"]["scope"], "http");
        assert_eq!(v["queries"]["total_calls"], 2);

        let (_, _, body) = send(
            create_router(state.clone()),
            Request::builder()
                .method("POST")
                .uri("/api/metrics/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["http"]["total_calls"], 0);
        assert!(v["http"]["slowest_call"].is_null());
        assert_eq!(v["queries"]["average_duration_ms"], 0.0);
    }

    #[tokio::test]
    async fn metrics_stream_pushes_server_snapshots() {
        use crate::metrics::stream::ServerMetrics;
        use tokio_stream::StreamExt;

        let state = seeded_state(2).await;
        let (status, _, _) = send(create_router(state.clone()), get_req("/books")).await;
        assert_eq!(status, StatusCode::OK);

        let resp = create_router(state)
            .oneshot(get_req("/api/metrics/stream"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");

        // The body never ends; read until the first complete event
        let mut body = resp.into_body().into_data_stream();
        let mut raw = String::new();
        while !raw.contains("\n\n") {
            let chunk = body.next().await.unwrap().unwrap();
            raw.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        let event = raw.split("\n\n").next().unwrap();
        let data = event.strip_prefix("data: ").unwrap();

        let metrics: ServerMetrics = serde_json::from_str(data).unwrap();
        assert_eq!(metrics.http.scope, "http");
        assert_eq!(metrics.http.total_calls, 1);
        assert_eq!(metrics.queries.scope, "queries");
        assert_eq!(metrics.queries.total_calls, 2);
    }
}
