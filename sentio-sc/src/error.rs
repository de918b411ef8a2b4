//! Error types for sentio-sc

use sentio_core::Error as CoreError;
use thiserror::Error;

/// Audio capture, extraction and classification errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio capture error: {0}")]
    Capture(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio format error: {0}")]
    Format(String),

    /// Request carried no samples
    #[error("No audio data provided")]
    NoAudio,

    /// Buffer was empty or silent after trimming
    #[error("Feature extraction error: {0}")]
    Extraction(String),

    /// Classifier artifacts failed to load at startup
    #[error("Detector not initialized")]
    ClassifierUnavailable,

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Model invocation error: {0}")]
    ModelInvocation(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<AudioError> for CoreError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::Io(e) => CoreError::Io(e),
            AudioError::Core(e) => e,
            AudioError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Audio(other.to_string()),
        }
    }
}
