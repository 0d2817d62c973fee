//! Media store abstraction.
//!
//! The gateway never keeps image bytes itself; every binary goes to an
//! external media host that hands back a public URL and an identifier.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Media store operation errors
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("media store returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("unexpected media store response: {0}")]
    InvalidResponse(String),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// What the media store reports for a stored binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    /// Publicly resolvable (HTTPS) URL.
    pub url: String,
    /// Identifier used to delete the binary later.
    pub public_id: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store `data` under `folder/name_hint` and return where it landed.
    async fn upload(&self, data: Bytes, folder: &str, name_hint: &str) -> MediaResult<UploadedMedia>;

    /// Remove a previously stored binary.
    async fn delete(&self, public_id: &str) -> MediaResult<()>;

    /// Cheap liveness probe against the service.
    async fn ping(&self) -> MediaResult<()>;
}
