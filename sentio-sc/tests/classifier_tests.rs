//! Classifier artifact loading and end-to-end voice prediction

use bytes::Bytes;
use sentio_sc::*;
use serde_json::json;
use std::f32::consts::PI;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const LABELS: [&str; 4] = ["angry", "happy", "neutral", "sad"];

fn write_artifacts(dir: &Path) {
    let scaler = json!({
        "mean": vec![0.0f32; FEATURE_LEN],
        "scale": vec![1.0f32; FEATURE_LEN],
    });
    let weights: Vec<Vec<f32>> = (0..LABELS.len())
        .map(|k| (0..FEATURE_LEN).map(|i| ((i + k) % 5) as f32 * 0.01 - 0.02).collect())
        .collect();
    let model = json!({ "weights": weights, "bias": [0.1, -0.1, 0.0, 0.05] });

    std::fs::write(dir.join("scaler.json"), scaler.to_string()).unwrap();
    std::fs::write(dir.join("model.json"), model.to_string()).unwrap();
    std::fs::write(dir.join("labels.json"), json!(LABELS).to_string()).unwrap();
}

fn sine(freq: f32, rate: u32, secs: f32) -> Vec<f32> {
    let n = (rate as f32 * secs) as usize;
    (0..n)
        .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / rate as f32).sin())
        .collect()
}

fn wav_f32(samples: &[f32], rate: u32) -> Bytes {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

struct NoMicrophone;

impl AudioSource for NoMicrophone {
    fn capture(&self, _duration: Duration, _rate: u32) -> Result<SampleBuffer, AudioError> {
        Err(AudioError::Device("no microphone in tests".to_string()))
    }

    fn name(&self) -> String {
        "none".to_string()
    }
}

fn predictor(dir: &Path) -> VoicePredictor {
    let classifier = EmotionClassifier::load(dir).unwrap();
    VoicePredictor::new(
        Some(Arc::new(classifier)),
        Arc::new(NoMicrophone),
        PredictionConfig::default(),
    )
}

#[test]
fn test_load_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let classifier = EmotionClassifier::load(dir.path()).unwrap();
    assert_eq!(classifier.labels(), &LABELS.map(String::from));
}

#[test]
fn test_missing_artifact_fails_whole_load() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    std::fs::remove_file(dir.path().join("labels.json")).unwrap();
    assert!(matches!(
        EmotionClassifier::load(dir.path()),
        Err(AudioError::ModelLoad(_))
    ));
}

#[test]
fn test_scaler_dimension_mismatch_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let bad = json!({ "mean": vec![0.0f32; 10], "scale": vec![1.0f32; 10] });
    std::fs::write(dir.path().join("scaler.json"), bad.to_string()).unwrap();
    assert!(EmotionClassifier::load(dir.path()).is_err());
}

#[test]
fn test_seven_second_sine_prediction() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let predictor = predictor(dir.path());

    let obs = predictor.predict_samples(sine(440.0, 22050, 7.0), Some(22050)).unwrap();
    assert!(LABELS.contains(&obs.label()));
    assert!((0.0..=1.0).contains(&obs.confidence()));
    let total: f32 = obs.distribution().values().sum();
    assert!((total - 1.0).abs() < 1e-3);
    assert_eq!(obs.distribution().len(), LABELS.len());
}

#[test]
fn test_empty_samples_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let err = predictor(dir.path()).predict_samples(Vec::new(), None).unwrap_err();
    assert!(matches!(err, AudioError::NoAudio));
    assert_eq!(err.to_string(), "No audio data provided");
}

#[test]
fn test_upload_matches_raw_samples() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let predictor = predictor(dir.path());

    let samples = sine(300.0, 22050, 2.0);
    let from_file = predictor
        .predict_upload(wav_f32(&samples, 22050), Some("clip.wav"))
        .unwrap();
    let from_raw = predictor.predict_samples(samples, Some(22050)).unwrap();

    assert_eq!(from_file.label(), from_raw.label());
    assert_eq!(from_file.confidence(), from_raw.confidence());
    assert_eq!(from_file.distribution(), from_raw.distribution());
}

#[test]
fn test_record_surfaces_device_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let result = predictor(dir.path()).record(&RecordOptions::default());
    assert!(matches!(result, Err(AudioError::Device(_))));
}
