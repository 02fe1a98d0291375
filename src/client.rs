use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::handlers::books::BookPage;
use crate::metrics::{Instrumenter, MeasureError};
use crate::store::{Book, NewBook};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A response whose body has been read exactly once into a shared buffer.
/// Sizing it for metrics never disturbs what the caller reads.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchedResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client for the catalog API. Every request goes through the
/// client-side instrumenter.
#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    instrumenter: Instrumenter,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, instrumenter: Instrumenter) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            instrumenter,
        }
    }

    pub fn instrumenter(&self) -> &Instrumenter {
        &self.instrumenter
    }

    /// Sends `request` as a measured call named `operation`.
    /// Non-2xx statuses are returned as `ClientError::Status`.
    pub async fn fetch(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<FetchedResponse, ClientError> {
        self.instrumenter
            .instrument_with(
                operation,
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    let headers = response.headers().clone();
                    let fetched = FetchedResponse {
                        status,
                        headers,
                        body: response.bytes().await?,
                    };
                    if !status.is_success() {
                        return Err(ClientError::Status {
                            status,
                            body: fetched.text(),
                        });
                    }
                    Ok::<_, ClientError>(fetched)
                },
                |r: &FetchedResponse| Ok::<_, MeasureError>(r.body.len() as u64),
            )
            .await
    }

    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        let req = self.http.get(format!("{}/health", self.base_url));
        self.fetch("GET /health", req).await?.json()
    }

    pub async fn list_books(&self, page: usize, limit: usize) -> Result<BookPage, ClientError> {
        let req = self
            .http
            .get(format!("{}/books", self.base_url))
            .query(&[("page", page), ("limit", limit)]);
        self.fetch("GET /books", req).await?.json()
    }

    pub async fn get_book(&self, id: &str) -> Result<Book, ClientError> {
        let req = self.http.get(format!("{}/books/{id}", self.base_url));
        self.fetch("GET /books/:id", req).await?.json()
    }

    pub async fn add_book(&self, book: &NewBook) -> Result<Book, ClientError> {
        let req = self.http.post(format!("{}/books", self.base_url)).json(book);
        self.fetch("POST /books", req).await?.json()
    }
}
