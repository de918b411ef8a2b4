//! Error types for sentio-eye

use sentio_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Encoding error: {0}")]
    Encode(String),

    /// The frame loop slot is held by another stream
    #[error("Video stream already running")]
    StreamBusy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Io(e) => CoreError::Io(e),
            VisionError::Core(e) => e,
            VisionError::Config(msg) => CoreError::Configuration(msg),
            VisionError::StreamBusy => CoreError::Concurrency(VisionError::StreamBusy.to_string()),
            other => CoreError::Vision(other.to_string()),
        }
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::Camera("Test error".to_string());
        assert!(err.to_string().contains("Camera error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_vision_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let vision_err: VisionError = io_err.into();
        assert!(matches!(vision_err, VisionError::Io(_)));
    }

    #[test]
    fn test_vision_error_to_core_error() {
        let core_err: CoreError = VisionError::Camera("Test".to_string()).into();
        match core_err {
            CoreError::Vision(msg) => assert!(msg.contains("Test")),
            other => panic!("Expected Vision error, got {:?}", other),
        }

        let core_err: CoreError = VisionError::StreamBusy.into();
        assert!(matches!(core_err, CoreError::Concurrency(_)));
    }
}
