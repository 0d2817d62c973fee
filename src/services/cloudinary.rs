//! Cloudinary media store client.
//!
//! Uploads and deletions go through the signed Upload API; the liveness probe
//! uses the Admin API `ping` with basic auth.

use crate::{
    config::CloudinaryCredentials,
    services::media_store::{MediaError, MediaResult, MediaStore, UploadedMedia},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, instrument};

const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Requires SHA-256 signatures to be enabled on the account.
const SIGNATURE_ALGORITHM: &str = "sha256";

#[derive(Clone)]
pub struct CloudinaryClient {
    credentials: CloudinaryCredentials,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryClient {
    pub fn new(credentials: CloudinaryCredentials) -> MediaResult<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            credentials,
            client,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/{}",
            CLOUDINARY_API_BASE, self.credentials.cloud_name, action
        )
    }

    fn sign(&self, params: &[(&str, &str)]) -> String {
        sign_params(params, &self.credentials.api_secret)
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> MediaResult<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or(text);
            return Err(MediaError::Service {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| MediaError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl MediaStore for CloudinaryClient {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn upload(&self, data: Bytes, folder: &str, name_hint: &str) -> MediaResult<UploadedMedia> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("folder", folder),
            ("public_id", name_hint),
            ("timestamp", timestamp.as_str()),
        ]);

        let file = Part::bytes(data.to_vec()).file_name(name_hint.to_string());
        let form = Form::new()
            .part("file", file)
            .text("folder", folder.to_string())
            .text("public_id", name_hint.to_string())
            .text("timestamp", timestamp)
            .text("api_key", self.credentials.api_key.clone())
            .text("signature_algorithm", SIGNATURE_ALGORITHM)
            .text("signature", signature);

        debug!("uploading image to Cloudinary");
        let response = self
            .client
            .post(self.endpoint("image/upload"))
            .multipart(form)
            .send()
            .await?;
        let body: UploadResponse = Self::read_json(response).await?;

        info!(public_id = %body.public_id, url = %body.secure_url, "image uploaded to Cloudinary");
        Ok(UploadedMedia {
            url: body.secure_url,
            public_id: body.public_id,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, public_id: &str) -> MediaResult<()> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let params = [
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
            ("api_key", self.credentials.api_key.as_str()),
            ("signature_algorithm", SIGNATURE_ALGORITHM),
            ("signature", signature.as_str()),
        ];
        let response = self
            .client
            .post(self.endpoint("image/destroy"))
            .form(&params)
            .send()
            .await?;
        let body: DestroyResponse = Self::read_json(response).await?;

        // Cloudinary answers 200 with `{"result": "not found"}` for unknown ids.
        if body.result != "ok" {
            return Err(MediaError::InvalidResponse(format!(
                "destroy returned `{}`",
                body.result
            )));
        }

        info!("deleted image from Cloudinary");
        Ok(())
    }

    async fn ping(&self) -> MediaResult<()> {
        let response = self
            .client
            .get(self.endpoint("ping"))
            .basic_auth(
                &self.credentials.api_key,
                Some(&self.credentials.api_secret),
            )
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Service {
                status: status.as_u16(),
                message: "ping failed".into(),
            });
        }
        Ok(())
    }
}

/// Build the `k=v&k=v` string Cloudinary signs: keys sorted, empty values dropped.
fn string_to_sign(params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// SHA-256 request signature (account must have SHA-256 signing enabled).
fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
