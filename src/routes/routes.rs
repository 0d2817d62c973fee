//! Defines the HTTP surface of the gateway.
//!
//! ## Structure
//! - `GET    /`                     static UI shell
//! - `POST   /upload_image`         camera upload (multipart field `image`)
//! - `POST   /upload_random_images` three synthetic test images
//! - `GET    /get_images`           list records (`source_type`, `limit`)
//! - `DELETE /delete_image/{id}`    remove binary (best effort) and record
//! - `GET    /health`               live probe of both upstreams
//! - `GET    /healthz`              liveness only

use crate::{
    handlers::{
        health_handlers::{health, healthz},
        image_handlers::{delete_image, get_images, upload_image, upload_random_images},
        ui_handlers::index,
    },
    services::image_service::ImageService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

/// Smallest request body limit, whatever the configured upload maximum.
const MIN_BODY_LIMIT: usize = 1024 * 1024;

/// Build the router for all gateway routes, without state.
pub fn routes() -> Router<ImageService> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/upload_image", post(upload_image))
        .route("/upload_random_images", post(upload_random_images))
        .route("/get_images", get(get_images))
        .route("/delete_image/{id}", delete(delete_image))
}

/// Build the complete application: routes, body limit, tracing, state.
///
/// The body limit sits well above the upload maximum so an oversized image
/// still reaches the size check and gets the JSON `File too large` answer.
pub fn app(service: ImageService) -> Router {
    let body_limit = service
        .settings()
        .max_upload_bytes
        .saturating_mul(2)
        .max(MIN_BODY_LIMIT);

    routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
