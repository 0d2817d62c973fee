//! HTTP handlers for image upload, listing and deletion.
//! Handlers only translate between HTTP and `ImageService`; every upstream
//! decision lives in the service.

use crate::{
    errors::AppError,
    handlers::client_ip::{ClientAddr, client_ip},
    models::{
        DeleteOutcome, ImageQuery, ImageRecord, Metadata, StoredImage, UploadOutcome,
        image_record::SOURCE_ESP32,
    },
    services::{image_service::ImageService, metadata_store::MetadataError},
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

/// Multipart field the camera firmware posts the JPEG under.
const IMAGE_FIELD: &str = "image";

/// Largest `limit` the metadata store accepts (Firestore limits are int32).
const MAX_IMAGE_LIMIT: usize = i32::MAX as usize;

/// Query params accepted by `GET /get_images`.
#[derive(Debug, Deserialize)]
pub struct GetImagesQuery {
    /// `all` or absent means no filter.
    pub source_type: Option<String>,
    /// Kept as text so a bad value gets a 400 with a message.
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    image_url: String,
    public_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    firebase_doc_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    success: bool,
    message: String,
    images: Vec<StoredImage>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ImagesResponse {
    success: bool,
    images: Vec<ImageRecord>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    success: bool,
    message: String,
}

/// POST `/upload_image`: camera upload (multipart, field `image`).
pub async fn upload_image(
    State(service): State<ImageService>,
    ClientAddr(socket): ClientAddr,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let ip_address = client_ip(&headers, socket, service.settings().trusted_proxies);
    info!(%ip_address, "received image upload request");

    let data = read_image_field(&mut multipart).await?;
    info!(size_bytes = data.len(), "image received");

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let mut metadata = Metadata::new();
    metadata.insert("file_size".into(), json!(data.len()));
    metadata.insert("ip_address".into(), json!(ip_address));
    metadata.insert("user_agent".into(), json!(user_agent));

    let outcome = service
        .handle_upload(data, SOURCE_ESP32, metadata, None)
        .await;
    upload_response(outcome)
}

/// Pull the bytes of the `image` field out of the form.
async fn read_image_field(multipart: &mut Multipart) -> Result<Bytes, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        if field.file_name() == Some("") {
            return Err(AppError::bad_request("No file selected"));
        }
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(AppError::bad_request("Empty image file"));
        }
        return Ok(data);
    }
    Err(AppError::bad_request("No image file provided"))
}

fn upload_response(outcome: UploadOutcome) -> Result<Response, AppError> {
    match outcome {
        UploadOutcome::Success {
            image_url,
            public_id,
            id,
        } => {
            let body = UploadResponse {
                success: true,
                message: "Image uploaded successfully".into(),
                image_url,
                public_id,
                firebase_doc_id: Some(id),
            };
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        UploadOutcome::PartialSuccess {
            image_url,
            public_id,
        } => {
            let body = UploadResponse {
                success: true,
                message: "Image uploaded to media store but failed to save metadata".into(),
                image_url,
                public_id,
                firebase_doc_id: None,
            };
            Ok((StatusCode::MULTI_STATUS, Json(body)).into_response())
        }
        UploadOutcome::TooLarge { .. } => Err(AppError::bad_request("File too large")),
        UploadOutcome::UploadFailed { .. } => {
            Err(AppError::internal("Failed to upload image to media store"))
        }
    }
}

/// POST `/upload_random_images`: push three synthetic images through the pipeline.
///
/// Always 200; `count` is how many binaries were stored.
pub async fn upload_random_images(State(service): State<ImageService>) -> impl IntoResponse {
    let report = service.upload_random_batch().await;
    let count = report.stored_count();
    let body = BatchResponse {
        success: true,
        message: format!("Successfully uploaded {} random images", count),
        images: report.stored,
        count,
    };
    (StatusCode::OK, Json(body))
}

/// GET `/get_images`: newest first, supports ?source_type=&limit=
pub async fn get_images(
    State(service): State<ImageService>,
    Query(q): Query<GetImagesQuery>,
) -> Result<Response, AppError> {
    if !service.metadata_available() {
        return Err(AppError::internal("Metadata store not initialized"));
    }

    let limit = match q.limit.as_deref() {
        None | Some("") => service.settings().default_image_limit,
        Some(raw) => match raw.parse::<usize>() {
            Ok(limit) if (1..=MAX_IMAGE_LIMIT).contains(&limit) => limit,
            _ => return Err(AppError::bad_request(format!("Invalid limit `{}`", raw))),
        },
    };
    let source_type = q
        .source_type
        .filter(|s| !s.is_empty() && s != "all");

    let query = ImageQuery { source_type, limit };
    let images = match service.list_images(&query).await {
        Ok(images) => images,
        Err(MetadataError::Unavailable) => {
            return Err(AppError::internal("Metadata store not initialized"));
        }
        Err(err) => {
            error!(error = %err, "error fetching images");
            return Err(AppError::internal(format!("Error fetching images: {}", err)));
        }
    };

    let count = images.len();
    let body = ImagesResponse {
        success: true,
        images,
        count,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// DELETE `/delete_image/{id}`: remove the binary (best effort) and the record.
pub async fn delete_image(
    State(service): State<ImageService>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    match service.handle_delete(&id).await {
        DeleteOutcome::Success => {
            let body = MessageResponse {
                success: true,
                message: "Image deleted successfully".into(),
            };
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        DeleteOutcome::NotFound => Err(AppError::not_found("Image not found in database")),
        DeleteOutcome::StoreUnavailable => {
            Err(AppError::internal("Metadata store not initialized"))
        }
        DeleteOutcome::DeleteFailed { reason } => Err(AppError::internal(format!(
            "Error deleting image: {}",
            reason
        ))),
    }
}
