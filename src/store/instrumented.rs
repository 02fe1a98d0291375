use std::sync::Arc;

use async_trait::async_trait;

use super::{Book, BookFilter, BookStore, NewBook, Projection, StoreError};
use crate::metrics::{json_size, Instrumenter};

/// Decorator that measures every call into the wrapped store.
pub struct InstrumentedStore {
    inner: Arc<dyn BookStore>,
    instrumenter: Instrumenter,
}

impl InstrumentedStore {
    pub fn new(inner: Arc<dyn BookStore>, instrumenter: Instrumenter) -> Self {
        Self {
            inner,
            instrumenter,
        }
    }
}

/// Names a query after the field it filters on.
fn describe(verb: &str, filter: &BookFilter) -> String {
    if filter.id.is_some() {
        format!("{verb} by Id")
    } else if filter.status.is_some() {
        format!("{verb} by Status")
    } else if filter.title.is_some() {
        format!("{verb} by Title")
    } else {
        format!("{verb} All Books")
    }
}

#[async_trait]
impl BookStore for InstrumentedStore {
    async fn find(
        &self,
        filter: &BookFilter,
        projection: &Projection,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Book>, StoreError> {
        let operation = describe("Find", filter);
        self.instrumenter
            .instrument(
                &operation,
                self.inner.find(filter, projection, skip, limit),
            )
            .await
    }

    async fn count(&self, filter: &BookFilter) -> Result<u64, StoreError> {
        let operation = describe("Count", filter);
        self.instrumenter
            .instrument_with(&operation, self.inner.count(filter), |count| {
                json_size(&serde_json::json!({ "count": count }))
            })
            .await
    }

    async fn insert(&self, book: NewBook) -> Result<Book, StoreError> {
        self.instrumenter
            .instrument("Insert Book", self.inner.insert(book))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::store::MemoryBookStore;

    /// Store whose every call fails.
    struct Broken;

    #[async_trait]
    impl BookStore for Broken {
        async fn find(
            &self,
            _: &BookFilter,
            _: &Projection,
            _: usize,
            _: Option<usize>,
        ) -> Result<Vec<Book>, StoreError> {
            Err(StoreError::Codec("disk on fire".into()))
        }

        async fn count(&self, _: &BookFilter) -> Result<u64, StoreError> {
            Err(StoreError::Codec("disk on fire".into()))
        }

        async fn insert(&self, _: NewBook) -> Result<Book, StoreError> {
            Err(StoreError::Codec("disk on fire".into()))
        }
    }

    fn wrap(inner: Arc<dyn BookStore>) -> (InstrumentedStore, Arc<MetricsCollector>) {
        let collector = Arc::new(MetricsCollector::new("queries"));
        let store = InstrumentedStore::new(inner, Instrumenter::new(collector.clone()));
        (store, collector)
    }

    fn new_book(title: &str) -> NewBook {
        NewBook {
            title: title.into(),
            author: "Jane Austen".into(),
            description: String::new(),
            status: "Reading".into(),
        }
    }

    #[test]
    fn operation_names_follow_filter() {
        assert_eq!(describe("Find", &BookFilter::default()), "Find All Books");
        assert_eq!(describe("Find", &BookFilter::by_status("Reading")), "Find by Status");
        assert_eq!(describe("Count", &BookFilter::by_id("x")), "Count by Id");
    }

    #[tokio::test]
    async fn every_call_is_measured_and_results_pass_through() {
        let (store, collector) = wrap(Arc::new(MemoryBookStore::new()));

        let inserted = store.insert(new_book("Emma")).await.unwrap();
        let found = store
            .find(&BookFilter::default(), &Projection::all(), 0, None)
            .await
            .unwrap();
        let count = store.count(&BookFilter::default()).await.unwrap();

        assert_eq!(found, vec![inserted.clone()]);
        assert_eq!(count, 1);

        let s = collector.snapshot();
        assert_eq!(s.total_calls, 3);
        let expected = json_size(&inserted).unwrap()
            + json_size(&vec![inserted]).unwrap()
            + r#"{"count":1}"#.len() as u64;
        assert_eq!(s.total_payload_bytes, expected);
        assert_eq!(s.largest_payload.unwrap().operation, "Find All Books");
    }

    #[tokio::test]
    async fn store_errors_propagate_and_count_as_failures() {
        let (store, collector) = wrap(Arc::new(Broken));

        let err = store
            .find(&BookFilter::by_status("Reading"), &Projection::all(), 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Codec(ref m) if m == "disk on fire"));
        assert!(store.count(&BookFilter::default()).await.is_err());
        assert!(store.insert(new_book("x")).await.is_err());

        let s = collector.snapshot();
        assert_eq!(s.total_calls, 0);
        assert_eq!(s.total_errors, 3);
        let ops: Vec<_> = s.recent_samples.iter().map(|r| r.operation.as_str()).collect();
        assert_eq!(ops, ["Find by Status", "Count All Books", "Insert Book"]);
    }
}
