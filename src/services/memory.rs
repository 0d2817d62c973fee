//! In-process implementations of both stores.
//!
//! Used by the `memory` backend for local runs without cloud accounts, and
//! by tests. Each store can be told to fail specific operations, and counts
//! the calls it receives.

use crate::{
    models::{ImageQuery, ImageRecord, NewImageRecord},
    services::{
        media_store::{MediaError, MediaResult, MediaStore, UploadedMedia},
        metadata_store::{MetadataError, MetadataResult, MetadataStore},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

#[derive(Debug, Default)]
struct CallCounts {
    upload: AtomicUsize,
    delete: AtomicUsize,
    insert: AtomicUsize,
    get: AtomicUsize,
}

/// Media store that keeps binaries in a map keyed by public id.
#[derive(Debug, Default)]
pub struct InMemoryMediaStore {
    objects: Mutex<HashMap<String, Bytes>>,
    /// Upload attempts (1-based) that should fail.
    failing_uploads: Mutex<HashSet<usize>>,
    fail_all_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    unreachable: AtomicBool,
    calls: CallCounts,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_all_uploads.store(fail, Ordering::SeqCst);
    }

    /// Fail only the `n`th upload attempt (1-based).
    pub fn fail_upload_number(&self, n: usize) {
        self.failing_uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(n);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make `ping` fail, as if the service could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.calls.upload.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }

    pub fn contains(&self, public_id: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(public_id)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn upload(&self, data: Bytes, folder: &str, name_hint: &str) -> MediaResult<UploadedMedia> {
        let attempt = self.calls.upload.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduled = self
            .failing_uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&attempt);
        if scheduled || self.fail_all_uploads.load(Ordering::SeqCst) {
            return Err(MediaError::Service {
                status: 503,
                message: "upload rejected".into(),
            });
        }

        let public_id = format!("{}/{}", folder, name_hint);
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(public_id.clone(), data);
        Ok(UploadedMedia {
            url: format!("memory://media/{}.jpg", public_id),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> MediaResult<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(MediaError::Service {
                status: 503,
                message: "delete rejected".into(),
            });
        }
        match self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(public_id)
        {
            Some(_) => Ok(()),
            None => Err(MediaError::InvalidResponse(format!(
                "destroy returned `not found` for {}",
                public_id
            ))),
        }
    }

    async fn ping(&self) -> MediaResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MediaError::Service {
                status: 503,
                message: "unreachable".into(),
            });
        }
        Ok(())
    }
}

/// Metadata store over a `Vec`, with a controllable clock for ordering tests.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: Mutex<Vec<ImageRecord>>,
    /// Next insert uses this timestamp instead of `Utc::now()`.
    pinned_time: Mutex<Option<DateTime<Utc>>>,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
    unreachable: AtomicBool,
    calls: CallCounts,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail as if the database could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn pin_time(&self, at: DateTime<Utc>) {
        *self.pinned_time.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
    }

    pub fn insert_calls(&self) -> usize {
        self.calls.insert.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.calls.get.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<ImageRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check_reachable(&self) -> MetadataResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MetadataError::Service {
                status: 503,
                message: "unreachable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert(&self, record: NewImageRecord) -> MetadataResult<String> {
        self.calls.insert.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(MetadataError::Service {
                status: 500,
                message: "insert rejected".into(),
            });
        }

        let timestamp = self
            .pinned_time
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_else(Utc::now);
        let id = Uuid::new_v4().simple().to_string();
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.into_record(id.clone(), timestamp));
        Ok(id)
    }

    async fn query(&self, query: &ImageQuery) -> MetadataResult<Vec<ImageRecord>> {
        self.check_reachable()?;
        let mut matching: Vec<ImageRecord> = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| {
                query
                    .source_type
                    .as_deref()
                    .is_none_or(|wanted| r.source_type == wanted)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(query.limit);
        Ok(matching)
    }

    async fn get(&self, id: &str) -> MetadataResult<Option<ImageRecord>> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn delete(&self, id: &str) -> MetadataResult<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(MetadataError::Service {
                status: 500,
                message: "delete rejected".into(),
            });
        }
        // Firestore deletes are idempotent; so is this.
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|r| r.id != id);
        Ok(())
    }

    async fn ping(&self) -> MetadataResult<()> {
        self.check_reachable()
    }
}
