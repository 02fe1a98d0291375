use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: String,
}

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "OK",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
