//! Firestore REST client implementing [`MetadataStore`].

use super::{
    auth::{ServiceAccountKey, TokenProvider},
    value::{decode_record, document_id, encode_record},
};
use crate::{
    config::FirestoreSettings,
    models::{ImageQuery, ImageRecord, NewImageRecord},
    services::metadata_store::{MetadataError, MetadataResult, MetadataStore},
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";
const EMULATOR_PROJECT_ID: &str = "demo-camgate";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Firestore rejects document ids longer than this.
const MAX_DOCUMENT_ID_BYTES: usize = 1500;

#[derive(Clone)]
pub struct FirestoreClient {
    client: reqwest::Client,
    /// `.../projects/{p}/databases/(default)/documents`
    documents_url: String,
    /// `{documents_url}/{collection}`; document urls are built from it
    /// segment by segment.
    collection_url: Url,
    collection: String,
    /// `None` when talking to the emulator.
    auth: Option<Arc<TokenProvider>>,
}

impl FirestoreClient {
    /// Build a client from settings. Fails when credentials cannot be loaded;
    /// no network call is made.
    pub fn new(settings: &FirestoreSettings, collection: &str) -> MetadataResult<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        if let Some(host) = settings.emulator_host.as_deref() {
            let project = settings
                .project_id
                .clone()
                .unwrap_or_else(|| EMULATOR_PROJECT_ID.to_string());
            info!(%host, %project, "using Firestore emulator");
            let documents_url = documents_url(&format!("http://{}/v1", host), &project);
            return Ok(Self {
                client,
                collection_url: collection_url(&documents_url, collection)?,
                documents_url,
                collection: collection.to_string(),
                auth: None,
            });
        }

        let key = ServiceAccountKey::from_file(&settings.credentials_path)?;
        let project = settings
            .project_id
            .clone()
            .or_else(|| key.project_id.clone())
            .ok_or_else(|| {
                MetadataError::Auth("no project id in settings or service-account key".into())
            })?;
        let auth = TokenProvider::new(key, client.clone())?;

        info!(%project, collection, "Firestore client configured");
        let documents_url = documents_url(FIRESTORE_API_BASE, &project);
        Ok(Self {
            client,
            collection_url: collection_url(&documents_url, collection)?,
            documents_url,
            collection: collection.to_string(),
            auth: Some(Arc::new(auth)),
        })
    }

    /// URL of document `id` in this collection, or `None` when `id` cannot
    /// name a document there. The id always stays a single escaped segment.
    fn document_url(&self, id: &str) -> Option<Url> {
        if !is_document_id(id) {
            return None;
        }
        let mut url = self.collection_url.clone();
        url.path_segments_mut().ok()?.push(id);
        Some(url)
    }

    async fn request(&self, method: Method, url: impl reqwest::IntoUrl) -> MetadataResult<RequestBuilder> {
        let builder = self.client.request(method, url);
        match &self.auth {
            Some(auth) => Ok(builder.bearer_auth(auth.token().await?)),
            None => Ok(builder),
        }
    }

    async fn send(builder: RequestBuilder) -> MetadataResult<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| body["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(text);
        Err(MetadataError::Service {
            status: status.as_u16(),
            message,
        })
    }

    fn structured_query(&self, query: &ImageQuery) -> Value {
        let mut structured = json!({
            "from": [{ "collectionId": self.collection }],
            "orderBy": [{
                "field": { "fieldPath": "timestamp" },
                "direction": "DESCENDING"
            }],
            "limit": query.limit,
        });
        if let Some(source_type) = &query.source_type {
            structured["where"] = json!({
                "fieldFilter": {
                    "field": { "fieldPath": "source_type" },
                    "op": "EQUAL",
                    "value": { "stringValue": source_type }
                }
            });
        }
        json!({ "structuredQuery": structured })
    }
}

fn documents_url(api_base: &str, project: &str) -> String {
    format!("{}/projects/{}/databases/(default)/documents", api_base, project)
}

fn collection_url(documents_url: &str, collection: &str) -> MetadataResult<Url> {
    let mut url = Url::parse(documents_url)
        .map_err(|err| MetadataError::Config(format!("invalid Firestore url `{}`: {}", documents_url, err)))?;
    url.path_segments_mut()
        .map_err(|_| MetadataError::Config(format!("Firestore url `{}` cannot take a path", documents_url)))?
        .push(collection);
    Ok(url)
}

/// Firestore document id rules: non-empty, at most 1500 bytes, no `/`,
/// not `.` or `..`, and not of the reserved form `__.*__`.
fn is_document_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_DOCUMENT_ID_BYTES
        && !id.contains('/')
        && id != "."
        && id != ".."
        && !(id.len() >= 4 && id.starts_with("__") && id.ends_with("__"))
}

#[async_trait]
impl MetadataStore for FirestoreClient {
    #[instrument(skip(self, record), fields(source_type = %record.source_type, public_id = %record.public_id))]
    async fn insert(&self, record: NewImageRecord) -> MetadataResult<String> {
        let body = encode_record(&record, &Utc::now());
        let builder = self.request(Method::POST, self.collection_url.clone()).await?;
        let response = Self::send(builder.json(&body)).await?;

        let created: Value = response
            .json()
            .await
            .map_err(|err| MetadataError::Decode(err.to_string()))?;
        let name = created["name"]
            .as_str()
            .ok_or_else(|| MetadataError::Decode("created document has no name".into()))?;
        let id = document_id(name).to_string();

        info!(%id, "image metadata saved to Firestore");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &ImageQuery) -> MetadataResult<Vec<ImageRecord>> {
        let url = format!("{}:runQuery", self.documents_url);
        let builder = self.request(Method::POST, url.as_str()).await?;
        let response = Self::send(builder.json(&self.structured_query(query))).await?;

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|err| MetadataError::Decode(err.to_string()))?;

        // Rows without a `document` only carry `readTime` (e.g. empty result).
        let mut records = Vec::with_capacity(rows.len());
        for document in rows.iter().filter_map(|row| row.get("document")) {
            records.push(decode_record(document).map_err(MetadataError::Decode)?);
        }

        debug!(count = records.len(), "queried Firestore");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> MetadataResult<Option<ImageRecord>> {
        let Some(url) = self.document_url(id) else {
            debug!("id cannot name a document; treating as missing");
            return Ok(None);
        };
        let builder = self.request(Method::GET, url).await?;
        let document = match Self::send(builder).await {
            Ok(response) => response
                .json::<Value>()
                .await
                .map_err(|err| MetadataError::Decode(err.to_string()))?,
            Err(MetadataError::Service { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        decode_record(&document)
            .map(Some)
            .map_err(MetadataError::Decode)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> MetadataResult<()> {
        // nothing under the collection can carry this id
        let Some(url) = self.document_url(id) else {
            return Ok(());
        };
        let builder = self.request(Method::DELETE, url).await?;
        Self::send(builder).await?;
        info!("deleted image metadata from Firestore");
        Ok(())
    }

    async fn ping(&self) -> MetadataResult<()> {
        let mut url = self.collection_url.clone();
        url.query_pairs_mut()
            .append_pair("pageSize", "1")
            .append_pair("mask.fieldPaths", "source_type");
        let builder = self.request(Method::GET, url).await?;
        if let Err(err) = Self::send(builder).await {
            warn!(error = %err, "Firestore ping failed");
            return Err(err);
        }
        Ok(())
    }
}
