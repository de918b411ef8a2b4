//! sentio-sc: sound capture and voice emotion classification
//!
//! Provides:
//! - Fixed-duration microphone capture (cpal) behind the `AudioSource` trait
//! - Deterministic 26-value feature extraction (cepstral, chroma, zero-crossing)
//! - A trained classifier loaded from JSON artifacts, with a rule-based fallback
//! - Upload decoding and resampling
//! - The background voice worker and request-driven prediction

pub mod error;
pub mod config;
pub mod buffer;
pub mod spectral;
pub mod features;
pub mod classifier;
pub mod heuristic;
pub mod resample;
pub mod decode;
pub mod capture;
pub mod worker;
pub mod predictor;

pub use error::AudioError;
pub use config::{AudioConfig, PredictionConfig, WorkerConfig};
pub use buffer::SampleBuffer;
pub use features::{FeatureExtractor, FeatureVector, FEATURE_LEN};
pub use classifier::{ClassifierModel, DecisionModel, EmotionClassifier, LinearSoftmax, StandardScaler};
pub use heuristic::HeuristicClassifier;
pub use decode::decode_upload;
pub use capture::{AudioSource, MicrophoneSource};
pub use worker::{Backoff, VoiceBackend, VoiceWorker};
pub use predictor::{RecordOptions, VoiceInfo, VoicePredictor};
