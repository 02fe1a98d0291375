use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Book, BookFilter, BookStore, NewBook, Projection, StoreError};

/// Process-local store used with `store: memory` and in tests.
#[derive(Default)]
pub struct MemoryBookStore {
    books: RwLock<Vec<Book>>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn find(
        &self,
        filter: &BookFilter,
        projection: &Projection,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Book>, StoreError> {
        let books = self.books.read();
        Ok(books
            .iter()
            .filter(|b| filter.matches(b))
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .map(|b| projection.apply(b))
            .collect())
    }

    async fn count(&self, filter: &BookFilter) -> Result<u64, StoreError> {
        Ok(self.books.read().iter().filter(|b| filter.matches(b)).count() as u64)
    }

    async fn insert(&self, book: NewBook) -> Result<Book, StoreError> {
        let book = Book::from_new(book);
        self.books.write().push(book.clone());
        Ok(book)
    }
}
