#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

use camgate::routes;
use camgate::services::image_service::{ImageService, ServiceSettings};
use camgate::services::memory::{InMemoryMediaStore, InMemoryMetadataStore};
use camgate::services::metadata_store::MetadataHandle;

pub const BOUNDARY: &str = "camgate-test-boundary";
pub const CLIENT_ADDR: &str = "192.168.4.2:51234";

// ---------------------------------------------------------------------------
// TestApp: a fresh router over in-memory stores per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub media: Arc<InMemoryMediaStore>,
    pub metadata: Arc<InMemoryMetadataStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body_bytes).into_owned()
    }

    pub fn message(&self) -> String {
        self.json()["message"].as_str().unwrap_or("").to_string()
    }
}

pub fn app() -> TestApp {
    TestApp::with_settings(ServiceSettings::default())
}

impl TestApp {
    pub fn with_settings(settings: ServiceSettings) -> Self {
        let media = Arc::new(InMemoryMediaStore::new());
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let service = ImageService::new(
            media.clone(),
            MetadataHandle::available(metadata.clone()),
            settings,
        );
        Self {
            router: routes::app(service),
            media,
            metadata,
        }
    }

    /// Router whose metadata store never initialized.
    pub fn without_metadata() -> Self {
        let media = Arc::new(InMemoryMediaStore::new());
        let service = ImageService::new(
            media.clone(),
            MetadataHandle::unavailable(),
            ServiceSettings::default(),
        );
        Self {
            router: routes::app(service),
            media,
            metadata: Arc::new(InMemoryMetadataStore::new()),
        }
    }

    // ------------------------------------------------------------------
    // Request helpers
    // ------------------------------------------------------------------

    pub async fn send(&self, mut req: Request<Body>) -> TestResponse {
        let addr: SocketAddr = CLIENT_ADDR.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body_bytes = resp.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            content_type,
            body_bytes,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    pub async fn post_empty(&self, uri: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    /// POST a multipart form with a single file field.
    pub async fn post_file(
        &self,
        uri: &str,
        field: &str,
        filename: &str,
        data: &[u8],
    ) -> TestResponse {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::USER_AGENT, "ESP32-CAM/1.0")
            .body(Body::from(multipart_body(field, filename, data)))
            .unwrap();
        self.send(req).await
    }

    pub async fn upload_jpeg(&self, data: &[u8]) -> TestResponse {
        self.post_file("/upload_image", "image", "capture.jpg", data)
            .await
    }
}

pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Bytes that look enough like a JPEG for the gateway (it never decodes them).
pub fn fake_jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0x42; len.max(4)];
    data[0] = 0xFF;
    data[1] = 0xD8;
    data.truncate(len);
    data
}
