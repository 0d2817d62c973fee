//! The persisted unit: one stored image and what we know about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form scalar metadata attached to a record. Passed through untouched.
pub type Metadata = Map<String, Value>;

/// Source tag for images posted by the camera.
pub const SOURCE_ESP32: &str = "esp32";

/// Source tag for synthetic test images.
pub const SOURCE_RANDOM: &str = "random";

/// A metadata record as stored in the metadata store.
///
/// Records are only ever inserted or deleted, never updated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageRecord {
    /// Identifier assigned by the metadata store on insert.
    pub id: String,

    /// Public URL of the stored binary.
    pub image_url: String,

    /// Media-store identifier, needed to delete the binary. Older records may lack it.
    #[serde(default)]
    pub public_id: Option<String>,

    /// Tag used for filtering (`esp32`, `random`, or caller-supplied).
    pub source_type: String,

    /// Creation time, set by the gateway when the record is inserted.
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: Metadata,
}

/// Everything the caller provides for an insert; the store fills in id and timestamp.
#[derive(Clone, Debug)]
pub struct NewImageRecord {
    pub image_url: String,
    pub public_id: String,
    pub source_type: String,
    pub metadata: Metadata,
}

impl NewImageRecord {
    pub fn into_record(self, id: String, timestamp: DateTime<Utc>) -> ImageRecord {
        ImageRecord {
            id,
            image_url: self.image_url,
            public_id: Some(self.public_id),
            source_type: self.source_type,
            timestamp,
            metadata: self.metadata,
        }
    }
}

/// Filter + bound for listing records. Results are always newest first.
#[derive(Clone, Debug)]
pub struct ImageQuery {
    /// Exact match on `source_type`; `None` returns every type.
    pub source_type: Option<String>,
    pub limit: usize,
}
