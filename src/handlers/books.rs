use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::store::{Book, BookFilter, NewBook, Projection};
use crate::AppState;

use super::AppError;

/// Hard cap on page size.
const MAX_LIMIT: usize = 100;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: usize,

    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Comma separated projection, e.g. `title,author`
    pub fields: Option<String>,

    pub status: Option<String>,
}

fn default_page() -> usize {
    1
}
fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

// ─── GET /books ──────────────────────────────────────────────────

pub async fn list_books(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<BookPage>, AppError> {
    if params.page == 0 {
        return Err(AppError::BadRequest("page must be at least 1".into()));
    }
    if params.limit == 0 {
        return Err(AppError::BadRequest("limit must be at least 1".into()));
    }
    let limit = params.limit.min(MAX_LIMIT);
    let skip = (params.page - 1).saturating_mul(limit);

    let filter = BookFilter {
        status: params.status,
        ..BookFilter::default()
    };
    let projection = params
        .fields
        .as_deref()
        .map(Projection::parse)
        .unwrap_or_default();

    let books = state
        .store
        .find(&filter, &projection, skip, Some(limit))
        .await?;
    let total = state.store.count(&filter).await?;

    Ok(Json(BookPage {
        books,
        total,
        page: params.page,
        limit,
    }))
}

// ─── GET /books/:id ──────────────────────────────────────────────

pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    let mut found = state
        .store
        .find(&BookFilter::by_id(&id), &Projection::all(), 0, Some(1))
        .await?;

    found
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("book '{id}' not found")))
}

// ─── POST /books ─────────────────────────────────────────────────

pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewBook>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("title must not be empty".into()));
    }

    let book = state.store.insert(req).await?;
    info!(id = %book.id, "book added");

    Ok((StatusCode::CREATED, Json(book)))
}
