//! Closed result sets returned by the image service instead of errors.

use serde::Serialize;

/// Result of pushing one image through upload-then-record.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Binary stored and metadata recorded.
    Success {
        image_url: String,
        public_id: String,
        id: String,
    },
    /// Binary stored and publicly reachable, but no metadata record exists.
    /// Left for an operator to reconcile.
    PartialSuccess { image_url: String, public_id: String },
    /// The media store rejected or failed the upload. Nothing was recorded.
    UploadFailed { reason: String },
    /// Payload exceeded the configured maximum. No external call was made.
    TooLarge { size: usize, max: usize },
}

/// Result of removing a record and its binary.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Success,
    NotFound,
    /// Metadata store is in degraded mode; nothing was touched.
    StoreUnavailable,
    /// The record was found but removing it failed.
    DeleteFailed { reason: String },
}

/// One entry of a synthetic batch, as reported to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredImage {
    pub image_url: String,
    pub public_id: String,
    pub firebase_doc_id: Option<String>,
}

/// Summary of a synthetic batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub attempted: usize,
    pub stored: Vec<StoredImage>,
}

impl BatchReport {
    pub fn stored_count(&self) -> usize {
        self.stored.len()
    }
}
