//! Request-driven voice prediction: live record, uploaded file, raw samples
//!
//! Every call builds its own `SampleBuffer` and returns directly; nothing
//! here touches the background worker or its latest-result cell. All calls
//! block, so async callers should run them on a blocking thread.

use crate::buffer::SampleBuffer;
use crate::capture::AudioSource;
use crate::classifier::EmotionClassifier;
use crate::config::{validate_sample_rate, PredictionConfig};
use crate::decode::decode_upload;
use crate::error::AudioError;
use crate::features::{FeatureExtractor, FEATURE_LEN};
use bytes::Bytes;
use sentio_core::EmotionObservation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Options accepted by record mode. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordOptions {
    /// Seconds to record
    #[serde(default)]
    pub duration: Option<f32>,

    /// Capture rate (Hz)
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

impl RecordOptions {
    /// Fill defaults and validate against `config`
    pub fn resolve(&self, config: &PredictionConfig) -> Result<(Duration, u32), AudioError> {
        let duration = self.duration.unwrap_or(config.default_duration_secs);
        if !(duration.is_finite() && duration > 0.0 && duration <= config.max_duration_secs) {
            return Err(AudioError::Config(format!(
                "duration must be in (0, {}] seconds",
                config.max_duration_secs
            )));
        }

        let sample_rate = self.sample_rate.unwrap_or(config.sample_rate);
        validate_sample_rate(sample_rate).map_err(AudioError::Config)?;

        Ok((Duration::from_secs_f32(duration), sample_rate))
    }
}

/// Capability summary served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub status: String,
    pub emotions: Vec<String>,
    pub sample_rate: u32,
    pub feature_count: usize,
    pub duration_recommended: f32,
}

/// Stateless predictor over an optional trained classifier
pub struct VoicePredictor {
    classifier: Option<Arc<EmotionClassifier>>,
    extractor: FeatureExtractor,
    source: Arc<dyn AudioSource>,
    config: PredictionConfig,
}

impl std::fmt::Debug for VoicePredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePredictor")
            .field("ready", &self.is_ready())
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish()
    }
}

impl VoicePredictor {
    pub fn new(
        classifier: Option<Arc<EmotionClassifier>>,
        source: Arc<dyn AudioSource>,
        config: PredictionConfig,
    ) -> Self {
        Self {
            classifier,
            extractor: FeatureExtractor::new(),
            source,
            config,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    fn classifier(&self) -> Result<&EmotionClassifier, AudioError> {
        self.classifier
            .as_deref()
            .ok_or(AudioError::ClassifierUnavailable)
    }

    pub fn info(&self) -> Result<VoiceInfo, AudioError> {
        let classifier = self.classifier()?;
        Ok(VoiceInfo {
            status: "ready".to_string(),
            emotions: classifier.labels().to_vec(),
            sample_rate: self.config.sample_rate,
            feature_count: FEATURE_LEN,
            duration_recommended: self.config.default_duration_secs,
        })
    }

    /// Extract and classify an already-built buffer
    pub fn predict_buffer(&self, buffer: &SampleBuffer) -> Result<EmotionObservation, AudioError> {
        let classifier = self.classifier()?;
        let features = self.extractor.extract(buffer)?;
        Ok(classifier.predict(&features))
    }

    /// Raw-array mode; `sample_rate` defaults to the canonical rate
    pub fn predict_samples(
        &self,
        samples: Vec<f32>,
        sample_rate: Option<u32>,
    ) -> Result<EmotionObservation, AudioError> {
        self.classifier()?;
        if samples.is_empty() {
            return Err(AudioError::NoAudio);
        }
        let rate = sample_rate.unwrap_or(self.config.sample_rate);
        validate_sample_rate(rate).map_err(AudioError::Config)?;

        let buffer = SampleBuffer::new(samples, rate)?;
        self.predict_buffer(&buffer)
    }

    /// File mode; the file name only supplies a format hint
    pub fn predict_upload(
        &self,
        data: Bytes,
        file_name: Option<&str>,
    ) -> Result<EmotionObservation, AudioError> {
        self.classifier()?;
        if data.is_empty() {
            return Err(AudioError::NoAudio);
        }
        let extension = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str());

        let buffer = decode_upload(data, extension, self.config.sample_rate)?;
        info!(
            file = file_name.unwrap_or(""),
            samples = buffer.len(),
            "decoded uploaded audio"
        );
        self.predict_buffer(&buffer)
    }

    /// Record mode: capture from the live input, then classify
    pub fn record(&self, options: &RecordOptions) -> Result<EmotionObservation, AudioError> {
        self.classifier()?;
        let (duration, sample_rate) = options.resolve(&self.config)?;
        info!(
            duration_secs = duration.as_secs_f32(),
            sample_rate,
            "recording for prediction"
        );
        let buffer = self.source.capture(duration, sample_rate)?;
        self.predict_buffer(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    impl AudioSource for CountingSource {
        fn capture(&self, duration: Duration, sample_rate: u32) -> Result<SampleBuffer, AudioError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = (duration.as_secs_f64() * f64::from(sample_rate)) as usize;
            let samples = (0..n)
                .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / sample_rate as f32).sin())
                .collect();
            SampleBuffer::new(samples, sample_rate)
        }

        fn name(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn test_record_options_defaults() {
        let config = PredictionConfig::default();
        let (duration, rate) = RecordOptions::default().resolve(&config).unwrap();
        assert_eq!(duration, Duration::from_secs(7));
        assert_eq!(rate, 22050);
    }

    #[test]
    fn test_record_options_rejects_invalid() {
        let config = PredictionConfig::default();
        let too_long = RecordOptions {
            duration: Some(120.0),
            sample_rate: None,
        };
        assert!(too_long.resolve(&config).is_err());
        let negative = RecordOptions {
            duration: Some(-1.0),
            sample_rate: None,
        };
        assert!(negative.resolve(&config).is_err());
        let bad_rate = RecordOptions {
            duration: None,
            sample_rate: Some(100),
        };
        assert!(bad_rate.resolve(&config).is_err());
    }

    #[test]
    fn test_record_options_rejects_unknown_keys() {
        let parsed: Result<RecordOptions, _> =
            serde_json::from_str(r#"{"duration": 2, "gain": 11}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unavailable_classifier_fails_fast() {
        let source = Arc::new(CountingSource::default());
        let predictor = VoicePredictor::new(None, source.clone(), PredictionConfig::default());

        assert!(matches!(predictor.info(), Err(AudioError::ClassifierUnavailable)));
        assert!(matches!(
            predictor.predict_samples(vec![0.1; 100], None),
            Err(AudioError::ClassifierUnavailable)
        ));
        assert!(matches!(
            predictor.predict_samples(vec![], None),
            Err(AudioError::ClassifierUnavailable)
        ));
        assert!(matches!(
            predictor.predict_upload(Bytes::from_static(b"RIFF"), Some("a.wav")),
            Err(AudioError::ClassifierUnavailable)
        ));
        assert!(matches!(
            predictor.record(&RecordOptions::default()),
            Err(AudioError::ClassifierUnavailable)
        ));
        // Nothing was recorded
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
