//! Error types for the Detection Gateway
//!
//! Only request-level failures live here. Best-effort steps (image archive,
//! remote backup, local persistence) have their own error types and are
//! logged by the upload orchestration, never returned to the device.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use espcam_core::DeviceId;
use serde_json::json;

use crate::inference::InferenceError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the uploading device
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no image received")]
    InvalidInput,

    #[error("ESP not registered: {0}")]
    UnknownDevice(DeviceId),

    #[error("roboflow failed: {0}")]
    UpstreamInference(#[from] InferenceError),

    #[error("failed to store image: {0}")]
    ImageSpool(#[source] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::InvalidInput => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "no image received" }),
            ),
            Error::UnknownDevice(device) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "ESP not registered", "esp_id": device }),
            ),
            Error::UpstreamInference(e) => {
                tracing::warn!(error = %e, "Inference request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "roboflow failed", "detail": e.to_string() }),
                )
            }
            Error::ImageSpool(e) => {
                tracing::error!(error = %e, "Failed to spool uploaded image");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "failed to store image", "detail": e.to_string() }),
                )
            }
            Error::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::InvalidInput.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::UnknownDevice(DeviceId::new("esp_9")).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::UpstreamInference(InferenceError::Api {
                status: 503,
                body: "busy".to_string(),
            })
            .into_response()
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
