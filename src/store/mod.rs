pub mod instrumented;
pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use instrumented::InstrumentedStore;
pub use memory::MemoryBookStore;
pub use redis_store::RedisBookStore;

// ─── Domain types ────────────────────────────────────────────────

/// A stored book. Text fields are optional because projections may drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// e.g. "Reading", "Completed"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
}

impl Book {
    /// Assigns a fresh id to an incoming book.
    pub fn from_new(new: NewBook) -> Self {
        Self {
            id: format!("bk_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            title: Some(new.title),
            author: Some(new.author),
            description: Some(new.description),
            status: Some(new.status),
        }
    }
}

/// Equality filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BookFilter {
    pub id: Option<String>,
    pub status: Option<String>,
    pub title: Option<String>,
}

impl BookFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.status.is_none() && self.title.is_none()
    }

    pub fn matches(&self, book: &Book) -> bool {
        fn eq(want: &Option<String>, have: Option<&String>) -> bool {
            want.as_ref().map_or(true, |w| have == Some(w))
        }
        eq(&self.id, Some(&book.id))
            && eq(&self.status, book.status.as_ref())
            && eq(&self.title, book.title.as_ref())
    }
}

/// Which fields to return. `id` is always kept; unknown names are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Option<Vec<String>>,
}

impl Projection {
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses a comma separated field list such as `"title,author"`.
    pub fn parse(list: &str) -> Self {
        let fields: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_owned)
            .collect();
        if fields.is_empty() {
            Self::all()
        } else {
            Self {
                fields: Some(fields),
            }
        }
    }

    fn keeps(&self, field: &str) -> bool {
        self.fields
            .as_ref()
            .map_or(true, |f| f.iter().any(|name| name == field))
    }

    pub fn apply(&self, mut book: Book) -> Book {
        if !self.keeps("title") {
            book.title = None;
        }
        if !self.keeps("author") {
            book.author = None;
        }
        if !self.keeps("description") {
            book.description = None;
        }
        if !self.keeps("status") {
            book.status = None;
        }
        book
    }
}

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("invalid record: {0}")]
    Codec(String),
}

// ─── Storage service ─────────────────────────────────────────────

/// The document store behind the catalog.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Books matching `filter` in insertion order, after skipping `skip`
    /// matches and returning at most `limit`.
    async fn find(
        &self,
        filter: &BookFilter,
        projection: &Projection,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Book>, StoreError>;

    async fn count(&self, filter: &BookFilter) -> Result<u64, StoreError>;

    async fn insert(&self, book: NewBook) -> Result<Book, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Book {
        Book {
            id: "bk_1".into(),
            title: Some("Dune".into()),
            author: Some("Frank Herbert".into()),
            description: Some("Spice".into()),
            status: Some("Reading".into()),
        }
    }

    #[test]
    fn filter_matches_on_set_fields_only() {
        let b = sample();
        assert!(BookFilter::default().matches(&b));
        assert!(BookFilter::by_status("Reading").matches(&b));
        assert!(!BookFilter::by_status("Completed").matches(&b));
        assert!(BookFilter::by_id("bk_1").matches(&b));
        assert!(!BookFilter::by_id("bk_2").matches(&b));
    }

    #[test]
    fn projection_keeps_id_and_named_fields() {
        let p = Projection::parse("title, status,bogus");
        let b = p.apply(sample());
        assert_eq!(b.id, "bk_1");
        assert_eq!(b.title.as_deref(), Some("Dune"));
        assert_eq!(b.status.as_deref(), Some("Reading"));
        assert!(b.author.is_none());
        assert!(b.description.is_none());

        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, r#"{"id":"bk_1","title":"Dune","status":"Reading"}"#);
    }

    #[test]
    fn empty_projection_keeps_everything() {
        assert_eq!(Projection::parse(" , "), Projection::all());
        assert_eq!(Projection::all().apply(sample()), sample());
    }

    #[test]
    fn new_books_get_prefixed_ids() {
        let b = Book::from_new(NewBook {
            title: "Emma".into(),
            author: String::new(),
            description: String::new(),
            status: String::new(),
        });
        assert!(b.id.starts_with("bk_"));
        assert_eq!(b.id.len(), 11);
        assert_eq!(b.title.as_deref(), Some("Emma"));
    }
}
