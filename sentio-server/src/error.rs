//! HTTP-facing errors

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use sentio_core::NEUTRAL_LABEL;
use sentio_eye::VisionError;
use sentio_sc::AudioError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Startup and lifecycle failures
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),
}

/// Request failures, rendered as a parseable observation-shaped body
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("Video stream not available")]
    VideoUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure body: neutral label, zero confidence, message and machine code
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub label: String,
    pub confidence: f32,
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Audio(e) => match e {
                AudioError::NoAudio => (StatusCode::BAD_REQUEST, "NO_AUDIO"),
                AudioError::Config(_) => (StatusCode::BAD_REQUEST, "INVALID_OPTIONS"),
                AudioError::Decode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "DECODE_FAILED"),
                AudioError::Extraction(_) => (StatusCode::UNPROCESSABLE_ENTITY, "EXTRACTION_FAILED"),
                AudioError::ClassifierUnavailable => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "DETECTOR_NOT_INITIALIZED")
                }
                AudioError::Capture(_) | AudioError::Device(_) | AudioError::Format(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CAPTURE_FAILED")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::Vision(VisionError::StreamBusy) => (StatusCode::CONFLICT, "STREAM_BUSY"),
            ApiError::Vision(_) => (StatusCode::INTERNAL_SERVER_ERROR, "VIDEO_ERROR"),
            ApiError::VideoUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "VIDEO_UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(code, error = %self, "request failed");
        } else {
            warn!(code, error = %self, "request rejected");
        }

        let body = ErrorResponse {
            label: NEUTRAL_LABEL.to_string(),
            confidence: 0.0,
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("prediction task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Audio(AudioError::NoAudio), StatusCode::BAD_REQUEST),
            (ApiError::Audio(AudioError::ClassifierUnavailable), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Audio(AudioError::Decode("x".into())), StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::Vision(VisionError::StreamBusy), StatusCode::CONFLICT),
            (ApiError::VideoUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::BadRequest("No file provided".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_and_code().0, status, "{}", err);
        }
    }

    #[test]
    fn test_messages() {
        assert_eq!(ApiError::Audio(AudioError::NoAudio).to_string(), "No audio data provided");
        assert_eq!(
            ApiError::Audio(AudioError::ClassifierUnavailable).to_string(),
            "Detector not initialized"
        );
    }
}
