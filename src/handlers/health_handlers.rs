//! Health handlers.
//!
//! - GET /healthz  -> liveness only, no I/O
//! - GET /health   -> probes both upstreams live on every call

use crate::services::image_service::ImageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Local, SecondsFormat};
use serde::Serialize;

/// `GET /healthz`
///
/// Liveness only; never touches an upstream.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(LivenessResponse { status: "ok" }))
}

/// `GET /health`
///
/// Always 200. Each upstream is reported `connected` or `disconnected`
/// according to a probe made during this request. A metadata store that
/// never initialized reports `disconnected`.
pub async fn health(State(service): State<ImageService>) -> impl IntoResponse {
    let report = service.health().await;

    let body = HealthResponse {
        status: "healthy",
        timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        services: ServiceStatus {
            cloudinary: connection_label(report.media_connected),
            firebase: connection_label(report.metadata_connected),
        },
        version: env!("CARGO_PKG_VERSION"),
    };
    (StatusCode::OK, Json(body))
}

fn connection_label(connected: bool) -> &'static str {
    if connected { "connected" } else { "disconnected" }
}

#[derive(Serialize)]
struct LivenessResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    services: ServiceStatus,
    version: &'static str,
}

#[derive(Serialize)]
struct ServiceStatus {
    cloudinary: &'static str,
    firebase: &'static str,
}
