//! Metadata store abstraction.
//!
//! Records live in an external document database. When that database could
//! not be initialized at startup the gateway runs without one; see
//! [`MetadataHandle`].

use crate::models::{ImageQuery, ImageRecord, NewImageRecord};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Metadata store operation errors
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata store is not initialized")]
    Unavailable,

    #[error("metadata store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metadata store returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("invalid metadata store configuration: {0}")]
    Config(String),

    #[error("metadata store authentication failed: {0}")]
    Auth(String),

    #[error("could not decode document: {0}")]
    Decode(String),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record; the store assigns id and timestamp. Returns the id.
    async fn insert(&self, record: NewImageRecord) -> MetadataResult<String>;

    /// Records matching `query`, newest first, at most `query.limit`.
    async fn query(&self, query: &ImageQuery) -> MetadataResult<Vec<ImageRecord>>;

    /// Fetch a single record. `Ok(None)` when it does not exist.
    async fn get(&self, id: &str) -> MetadataResult<Option<ImageRecord>>;

    async fn delete(&self, id: &str) -> MetadataResult<()>;

    /// Cheap liveness probe against the service.
    async fn ping(&self) -> MetadataResult<()>;
}

/// A metadata store that may be absent.
///
/// `None` is the degraded mode entered when the store failed to initialize.
/// Every operation then fails with [`MetadataError::Unavailable`] without
/// attempting a call.
#[derive(Clone, Default)]
pub struct MetadataHandle(Option<Arc<dyn MetadataStore>>);

impl MetadataHandle {
    pub fn available(store: Arc<dyn MetadataStore>) -> Self {
        Self(Some(store))
    }

    pub fn unavailable() -> Self {
        Self(None)
    }

    pub fn is_available(&self) -> bool {
        self.0.is_some()
    }

    fn store(&self) -> MetadataResult<&Arc<dyn MetadataStore>> {
        self.0.as_ref().ok_or(MetadataError::Unavailable)
    }

    pub async fn insert(&self, record: NewImageRecord) -> MetadataResult<String> {
        self.store()?.insert(record).await
    }

    pub async fn query(&self, query: &ImageQuery) -> MetadataResult<Vec<ImageRecord>> {
        self.store()?.query(query).await
    }

    pub async fn get(&self, id: &str) -> MetadataResult<Option<ImageRecord>> {
        self.store()?.get(id).await
    }

    pub async fn delete(&self, id: &str) -> MetadataResult<()> {
        self.store()?.delete(id).await
    }

    pub async fn ping(&self) -> MetadataResult<()> {
        self.store()?.ping().await
    }
}
