//! ImageService: upload-then-record orchestration over the two external
//! stores, plus delete, listing, the synthetic batch and health probing.
//!
//! Every upstream failure is caught here and turned into an outcome; nothing
//! is retried and nothing is rolled back. Each external call is attempted
//! exactly once per request.

use crate::{
    config::AppConfig,
    models::{
        BatchReport, DeleteOutcome, ImageQuery, ImageRecord, Metadata, NewImageRecord,
        StoredImage, UploadOutcome, image_record::SOURCE_RANDOM,
    },
    services::{
        media_store::MediaStore,
        metadata_store::{MetadataHandle, MetadataResult},
        synthetic,
    },
};
use bytes::Bytes;
use chrono::{DateTime, Local};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-process knobs the orchestration needs.
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub max_upload_bytes: usize,
    pub media_folder: String,
    pub default_image_limit: usize,
    pub jpeg_quality: u8,
    pub trusted_proxies: usize,
}

impl From<&AppConfig> for ServiceSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_upload_bytes: cfg.max_upload_bytes,
            media_folder: cfg.media_folder.clone(),
            default_image_limit: cfg.default_image_limit,
            jpeg_quality: cfg.jpeg_quality,
            trusted_proxies: cfg.trusted_proxies,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: crate::config::DEFAULT_MAX_UPLOAD_BYTES,
            media_folder: "esp32_images".into(),
            default_image_limit: 50,
            jpeg_quality: 85,
            trusted_proxies: 0,
        }
    }
}

/// Reachability of both upstreams, probed at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub media_connected: bool,
    pub metadata_connected: bool,
}

/// Shared router state. Cheap to clone; the stores sit behind `Arc`s.
#[derive(Clone)]
pub struct ImageService {
    media: Arc<dyn MediaStore>,
    metadata: MetadataHandle,
    settings: Arc<ServiceSettings>,
}

impl ImageService {
    pub fn new(media: Arc<dyn MediaStore>, metadata: MetadataHandle, settings: ServiceSettings) -> Self {
        Self {
            media,
            metadata,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn metadata_available(&self) -> bool {
        self.metadata.is_available()
    }

    /// Store `data` in the media store, then record it in the metadata store.
    ///
    /// `name_hint` defaults to `{source_type}_{timestamp}`.
    pub async fn handle_upload(
        &self,
        data: Bytes,
        source_type: &str,
        metadata: Metadata,
        name_hint: Option<&str>,
    ) -> UploadOutcome {
        let size = data.len();
        if size > self.settings.max_upload_bytes {
            warn!(size_bytes = size, max = self.settings.max_upload_bytes, %source_type, "rejecting oversized upload");
            return UploadOutcome::TooLarge {
                size,
                max: self.settings.max_upload_bytes,
            };
        }

        let name = match name_hint {
            Some(hint) => hint.to_string(),
            None => default_name_hint(source_type),
        };
        let folder = format!("{}/{}", self.settings.media_folder, source_type);

        let uploaded = match self.media.upload(data, &folder, &name).await {
            Ok(uploaded) => uploaded,
            Err(err) => {
                error!(error = %err, %source_type, %name, "media upload failed");
                return UploadOutcome::UploadFailed {
                    reason: err.to_string(),
                };
            }
        };

        let record = NewImageRecord {
            image_url: uploaded.url.clone(),
            public_id: uploaded.public_id.clone(),
            source_type: source_type.to_string(),
            metadata,
        };
        match self.metadata.insert(record).await {
            Ok(id) => {
                info!(%id, public_id = %uploaded.public_id, %source_type, "image stored and recorded");
                UploadOutcome::Success {
                    image_url: uploaded.url,
                    public_id: uploaded.public_id,
                    id,
                }
            }
            Err(err) => {
                // Binary is live but unrecorded; an operator has to reconcile it.
                error!(
                    error = %err,
                    public_id = %uploaded.public_id,
                    image_url = %uploaded.url,
                    %source_type,
                    "image uploaded but metadata insert failed"
                );
                UploadOutcome::PartialSuccess {
                    image_url: uploaded.url,
                    public_id: uploaded.public_id,
                }
            }
        }
    }

    /// Remove a record and, best effort, its binary.
    ///
    /// The media delete runs first and its failure is only logged; the
    /// metadata delete decides the outcome.
    pub async fn handle_delete(&self, id: &str) -> DeleteOutcome {
        if !self.metadata.is_available() {
            warn!(%id, "delete requested while metadata store is unavailable");
            return DeleteOutcome::StoreUnavailable;
        }

        let record = match self.metadata.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return DeleteOutcome::NotFound,
            Err(err) => {
                error!(error = %err, %id, "fetching record for delete failed");
                return DeleteOutcome::DeleteFailed {
                    reason: err.to_string(),
                };
            }
        };

        if let Some(public_id) = record.public_id.as_deref() {
            match self.media.delete(public_id).await {
                Ok(()) => info!(%id, %public_id, "deleted binary from media store"),
                Err(err) => {
                    warn!(error = %err, %id, %public_id, "media delete failed; removing record anyway")
                }
            }
        }

        match self.metadata.delete(id).await {
            Ok(()) => {
                info!(%id, "deleted image record");
                DeleteOutcome::Success
            }
            Err(err) => {
                error!(error = %err, %id, public_id = ?record.public_id, "metadata delete failed");
                DeleteOutcome::DeleteFailed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Records newest first, optionally filtered by source type.
    pub async fn list_images(&self, query: &ImageQuery) -> MetadataResult<Vec<ImageRecord>> {
        let records = self.metadata.query(query).await?;
        info!(count = records.len(), source_type = ?query.source_type, "retrieved images");
        Ok(records)
    }

    /// Generate and push [`synthetic::BATCH_SIZE`] test images, one at a time.
    ///
    /// A failed image does not stop the batch.
    pub async fn upload_random_batch(&self) -> BatchReport {
        let mut stored = Vec::new();

        for index in 0..synthetic::BATCH_SIZE {
            let number = index + 1;
            let data = match synthetic::generate(index, Local::now(), self.settings.jpeg_quality) {
                Ok(data) => data,
                Err(err) => {
                    error!(error = %err, number, "could not generate synthetic image");
                    continue;
                }
            };

            let mut metadata = Metadata::new();
            metadata.insert("test_number".into(), json!(number));
            metadata.insert(
                "description".into(),
                json!(format!("Random test image {}", number)),
            );

            let name = format!("test_image_{}", number);
            match self
                .handle_upload(data, SOURCE_RANDOM, metadata, Some(&name))
                .await
            {
                UploadOutcome::Success {
                    image_url,
                    public_id,
                    id,
                } => stored.push(StoredImage {
                    image_url,
                    public_id,
                    firebase_doc_id: Some(id),
                }),
                UploadOutcome::PartialSuccess {
                    image_url,
                    public_id,
                } => stored.push(StoredImage {
                    image_url,
                    public_id,
                    firebase_doc_id: None,
                }),
                UploadOutcome::UploadFailed { .. } | UploadOutcome::TooLarge { .. } => {}
            }
        }

        info!(stored = stored.len(), attempted = synthetic::BATCH_SIZE, "synthetic batch finished");
        BatchReport {
            attempted: synthetic::BATCH_SIZE,
            stored,
        }
    }

    /// Probe both upstreams concurrently.
    pub async fn health(&self) -> HealthReport {
        let (media, metadata) = futures::join!(self.media.ping(), self.metadata.ping());
        if let Err(err) = &media {
            warn!(error = %err, "media store health probe failed");
        }
        if let Err(err) = &metadata {
            warn!(error = %err, "metadata store health probe failed");
        }
        HealthReport {
            media_connected: media.is_ok(),
            metadata_connected: metadata.is_ok(),
        }
    }
}

fn default_name_hint(source_type: &str) -> String {
    name_hint_at(source_type, Local::now())
}

/// Local wall-clock time, like the synthetic labels and `/health`.
fn name_hint_at(source_type: &str, at: DateTime<Local>) -> String {
    format!("{}_{}", source_type, at.format("%Y%m%d_%H%M%S_%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::image_record::SOURCE_ESP32,
        services::memory::{InMemoryMediaStore, InMemoryMetadataStore},
    };
    use chrono::{TimeZone, Utc};

    struct Harness {
        media: Arc<InMemoryMediaStore>,
        metadata: Arc<InMemoryMetadataStore>,
        service: ImageService,
    }

    fn harness_with(settings: ServiceSettings) -> Harness {
        let media = Arc::new(InMemoryMediaStore::new());
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let service = ImageService::new(
            media.clone(),
            MetadataHandle::available(metadata.clone()),
            settings,
        );
        Harness {
            media,
            metadata,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(ServiceSettings::default())
    }

    fn jpeg(len: usize) -> Bytes {
        Bytes::from(vec![0xAB; len])
    }

    #[tokio::test]
    async fn oversized_payload_never_reaches_media_store() {
        let h = harness_with(ServiceSettings {
            max_upload_bytes: 8,
            ..ServiceSettings::default()
        });

        let outcome = h
            .service
            .handle_upload(jpeg(9), SOURCE_ESP32, Metadata::new(), None)
            .await;

        assert_eq!(outcome, UploadOutcome::TooLarge { size: 9, max: 8 });
        assert_eq!(h.media.upload_calls(), 0);
        assert_eq!(h.metadata.insert_calls(), 0);
    }

    #[tokio::test]
    async fn payload_at_the_limit_is_accepted() {
        let h = harness_with(ServiceSettings {
            max_upload_bytes: 8,
            ..ServiceSettings::default()
        });
        let outcome = h
            .service
            .handle_upload(jpeg(8), SOURCE_ESP32, Metadata::new(), None)
            .await;
        assert!(matches!(outcome, UploadOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn failed_upload_writes_no_metadata() {
        let h = harness();
        h.media.fail_uploads(true);

        let outcome = h
            .service
            .handle_upload(jpeg(16), SOURCE_ESP32, Metadata::new(), None)
            .await;

        assert!(matches!(outcome, UploadOutcome::UploadFailed { .. }));
        assert_eq!(h.media.upload_calls(), 1);
        assert_eq!(h.metadata.insert_calls(), 0);
        assert!(h.metadata.is_empty());
    }

    #[tokio::test]
    async fn failed_insert_is_partial_success_without_id() {
        let h = harness();
        h.metadata.fail_inserts(true);

        let outcome = h
            .service
            .handle_upload(jpeg(16), SOURCE_ESP32, Metadata::new(), Some("cam_shot"))
            .await;

        match outcome {
            UploadOutcome::PartialSuccess {
                image_url,
                public_id,
            } => {
                assert_eq!(public_id, "esp32_images/esp32/cam_shot");
                assert!(image_url.contains("cam_shot"));
                // binary stays put; no rollback
                assert!(h.media.contains(&public_id));
            }
            other => panic!("expected partial success, got {:?}", other),
        }
        assert_eq!(h.metadata.insert_calls(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_makes_upload_partial() {
        let media = Arc::new(InMemoryMediaStore::new());
        let service = ImageService::new(
            media.clone(),
            MetadataHandle::unavailable(),
            ServiceSettings::default(),
        );

        let outcome = service
            .handle_upload(jpeg(4), SOURCE_ESP32, Metadata::new(), None)
            .await;

        assert!(matches!(outcome, UploadOutcome::PartialSuccess { .. }));
        assert_eq!(media.upload_calls(), 1);
    }

    #[tokio::test]
    async fn successful_upload_records_metadata() {
        let h = harness();
        let mut metadata = Metadata::new();
        metadata.insert("file_size".into(), json!(16));

        let outcome = h
            .service
            .handle_upload(jpeg(16), SOURCE_ESP32, metadata, None)
            .await;

        let UploadOutcome::Success { id, public_id, .. } = outcome else {
            panic!("expected success");
        };
        let records = h.metadata.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].public_id.as_deref(), Some(public_id.as_str()));
        assert_eq!(records[0].source_type, SOURCE_ESP32);
        assert_eq!(records[0].metadata["file_size"], json!(16));
        assert!(public_id.starts_with("esp32_images/esp32/esp32_"));
    }

    #[test]
    fn name_hint_uses_local_wall_clock() {
        let at = Local
            .with_ymd_and_hms(2025, 6, 7, 23, 59, 58)
            .unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(name_hint_at(SOURCE_ESP32, at), "esp32_20250607_235958_042");
    }

    #[tokio::test]
    async fn identical_uploads_create_distinct_records() {
        let h = harness();
        for _ in 0..2 {
            h.service
                .handle_upload(jpeg(4), SOURCE_ESP32, Metadata::new(), Some("same"))
                .await;
        }
        let records = h.metadata.snapshot();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
    }

    #[tokio::test]
    async fn deleting_missing_id_touches_no_media() {
        let h = harness();
        assert_eq!(h.service.handle_delete("ghost").await, DeleteOutcome::NotFound);
        assert_eq!(h.media.delete_calls(), 0);
    }

    #[tokio::test]
    async fn delete_removes_binary_and_record() {
        let h = harness();
        let UploadOutcome::Success { id, public_id, .. } = h
            .service
            .handle_upload(jpeg(4), SOURCE_ESP32, Metadata::new(), None)
            .await
        else {
            panic!("expected success");
        };

        assert_eq!(h.service.handle_delete(&id).await, DeleteOutcome::Success);
        assert!(!h.media.contains(&public_id));
        assert!(h.metadata.is_empty());
    }

    #[tokio::test]
    async fn media_delete_failure_still_removes_record() {
        let h = harness();
        let UploadOutcome::Success { id, public_id, .. } = h
            .service
            .handle_upload(jpeg(4), SOURCE_ESP32, Metadata::new(), None)
            .await
        else {
            panic!("expected success");
        };
        h.media.fail_deletes(true);

        assert_eq!(h.service.handle_delete(&id).await, DeleteOutcome::Success);
        assert_eq!(h.media.delete_calls(), 1);
        assert!(h.media.contains(&public_id));
        assert!(h.metadata.is_empty());
    }

    #[tokio::test]
    async fn metadata_delete_failure_is_reported() {
        let h = harness();
        let UploadOutcome::Success { id, .. } = h
            .service
            .handle_upload(jpeg(4), SOURCE_ESP32, Metadata::new(), None)
            .await
        else {
            panic!("expected success");
        };
        h.metadata.fail_deletes(true);

        assert!(matches!(
            h.service.handle_delete(&id).await,
            DeleteOutcome::DeleteFailed { .. }
        ));
    }

    #[tokio::test]
    async fn delete_with_unavailable_store_does_nothing() {
        let media = Arc::new(InMemoryMediaStore::new());
        let service = ImageService::new(
            media.clone(),
            MetadataHandle::unavailable(),
            ServiceSettings::default(),
        );
        assert_eq!(service.handle_delete("any").await, DeleteOutcome::StoreUnavailable);
        assert_eq!(media.delete_calls(), 0);
    }

    #[tokio::test]
    async fn list_filters_by_source_newest_first() {
        let h = harness();
        let plan = [
            (SOURCE_RANDOM, 1),
            (SOURCE_ESP32, 2),
            (SOURCE_RANDOM, 3),
            (SOURCE_ESP32, 4),
            (SOURCE_RANDOM, 5),
        ];
        for (source, second) in plan {
            h.metadata
                .pin_time(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, second).unwrap());
            h.service
                .handle_upload(jpeg(4), source, Metadata::new(), Some(&format!("n{}", second)))
                .await;
        }

        let records = h
            .service
            .list_images(&ImageQuery {
                source_type: Some(SOURCE_RANDOM.into()),
                limit: 2,
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source_type == SOURCE_RANDOM));
        assert!(records[0].timestamp > records[1].timestamp);
        assert_eq!(records[0].public_id.as_deref(), Some("esp32_images/random/n5"));
    }

    #[tokio::test]
    async fn batch_always_attempts_three_and_survives_a_failure() {
        let h = harness();
        h.media.fail_upload_number(2);

        let report = h.service.upload_random_batch().await;

        assert_eq!(report.attempted, 3);
        assert_eq!(h.media.upload_calls(), 3);
        assert_eq!(report.stored_count(), 2);
        let ids: Vec<_> = report.stored.iter().map(|s| s.public_id.as_str()).collect();
        assert_eq!(
            ids,
            ["esp32_images/random/test_image_1", "esp32_images/random/test_image_3"]
        );
        let first = h
            .metadata
            .snapshot()
            .into_iter()
            .find(|r| r.public_id.as_deref() == Some("esp32_images/random/test_image_1"))
            .unwrap();
        assert_eq!(first.metadata["test_number"], json!(1));
        assert_eq!(first.metadata["description"], json!("Random test image 1"));
    }

    #[tokio::test]
    async fn health_reports_each_store() {
        let h = harness();
        assert_eq!(
            h.service.health().await,
            HealthReport {
                media_connected: true,
                metadata_connected: true
            }
        );

        h.metadata.set_unreachable(true);
        let report = h.service.health().await;
        assert!(report.media_connected);
        assert!(!report.metadata_connected);
    }
}
