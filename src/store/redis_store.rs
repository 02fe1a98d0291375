use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use super::{Book, BookFilter, BookStore, NewBook, Projection, StoreError};

/// List of book ids in insertion order.
const INDEX_KEY: &str = "books:index";

fn book_key(id: &str) -> String {
    format!("book:{id}")
}

/// Books stored as one hash per book plus an ordered id index.
///
/// `ConnectionManager` is cheaply cloneable; every clone shares the same
/// multiplexed connection and reconnects on failure.
#[derive(Clone)]
pub struct RedisBookStore {
    conn: ConnectionManager,
}

impl RedisBookStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url, "connected to redis");
        Ok(Self { conn })
    }

    /// Loads the full records for `ids`, skipping ids whose hash is gone.
    async fn load(&self, ids: &[String]) -> Result<Vec<Book>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in ids {
            pipe.hgetall(book_key(id));
        }
        let mut conn = self.conn.clone();
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        maps.iter()
            .filter(|m| !m.is_empty())
            .map(book_from_map)
            .collect()
    }

    async fn matching(&self, filter: &BookFilter) -> Result<Vec<Book>, StoreError> {
        let ids: Vec<String> = match &filter.id {
            Some(id) => vec![id.clone()],
            None => {
                let mut conn = self.conn.clone();
                conn.lrange(INDEX_KEY, 0, -1).await?
            }
        };
        let mut books = self.load(&ids).await?;
        books.retain(|b| filter.matches(b));
        Ok(books)
    }

    /// One page of the unfiltered catalog, read straight off the index.
    async fn page(&self, skip: usize, limit: Option<usize>) -> Result<Vec<Book>, StoreError> {
        let Some((start, stop)) = page_bounds(skip, limit) else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(INDEX_KEY, start, stop).await?;
        self.load(&ids).await
    }
}

#[async_trait]
impl BookStore for RedisBookStore {
    async fn find(
        &self,
        filter: &BookFilter,
        projection: &Projection,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Book>, StoreError> {
        let books = if filter.is_empty() {
            self.page(skip, limit).await?
        } else {
            self.matching(filter)
                .await?
                .into_iter()
                .skip(skip)
                .take(limit.unwrap_or(usize::MAX))
                .collect()
        };
        Ok(books.into_iter().map(|b| projection.apply(b)).collect())
    }

    /// The index and the hashes are written in one transaction and never
    /// deleted, so the index length is the number of books.
    async fn count(&self, filter: &BookFilter) -> Result<u64, StoreError> {
        if filter.is_empty() {
            let mut conn = self.conn.clone();
            let n: u64 = conn.llen(INDEX_KEY).await?;
            return Ok(n);
        }
        Ok(self.matching(filter).await?.len() as u64)
    }

    async fn insert(&self, book: NewBook) -> Result<Book, StoreError> {
        let book = Book::from_new(book);
        let key = book_key(&book.id);

        let fields = [
            ("id", book.id.as_str()),
            ("title", book.title.as_deref().unwrap_or_default()),
            ("author", book.author.as_deref().unwrap_or_default()),
            ("description", book.description.as_deref().unwrap_or_default()),
            ("status", book.status.as_deref().unwrap_or_default()),
        ];

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .rpush(INDEX_KEY, &book.id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(book)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Inclusive `LRANGE` bounds for `limit` ids starting at `skip`.
/// `None` when the page is empty by construction.
fn page_bounds(skip: usize, limit: Option<usize>) -> Option<(isize, isize)> {
    let start = isize::try_from(skip).ok()?;
    match limit {
        None => Some((start, -1)),
        Some(0) => None,
        Some(n) => {
            let span = isize::try_from(n - 1).unwrap_or(isize::MAX);
            Some((start, start.saturating_add(span)))
        }
    }
}

fn book_from_map(map: &HashMap<String, String>) -> Result<Book, StoreError> {
    let id = map
        .get("id")
        .cloned()
        .ok_or_else(|| StoreError::Codec("book hash without id".into()))?;
    Ok(Book {
        id,
        title: map.get("title").cloned(),
        author: map.get("author").cloned(),
        description: map.get("description").cloned(),
        status: map.get("status").cloned(),
    })
}
