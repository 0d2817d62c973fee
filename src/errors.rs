use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Request-level failure returned by handlers.
///
/// Upstream failures never reach this type directly: the image service turns
/// them into outcomes first, and handlers pick the status from the outcome.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

/// Wire shape of every failed response.
#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    // camera firmware reads `error`, the UI reads `message`
    error: &'a str,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400, for input the client has to fix.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: &self.message,
            error: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Malformed multipart bodies keep the status axum assigns them.
impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn error_body_carries_message_twice() {
        let resp = AppError::not_found("Image not found in database").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Image not found in database");
        assert_eq!(body["error"], "Image not found in database");
    }

    #[test]
    fn display_is_the_message() {
        assert_eq!(AppError::bad_request("File too large").to_string(), "File too large");
    }
}
