// End-to-end scenarios across voice prediction, the confidence gate and the video loop

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use image::RgbImage;
use sentio_core::{LoopPhase, Region};
use sentio_eye::{
    ExpressionAnalysis, ExpressionClassifier, ExpressionOutput, FaceAnalyzer, FaceLocalizer, Frame,
    FrameSource, FrameSourceFactory, VideoPipeline, VisionError,
};
use sentio_sc::{AudioError, AudioSource, EmotionClassifier, FeatureExtractor, SampleBuffer, FEATURE_LEN};
use sentio_server::{create_router, EmotionService, SentioConfig, ServiceParts};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn write_artifacts(dir: &Path, labels: &[&str], weight: f32) {
    let weights: Vec<Vec<f32>> = (0..labels.len())
        .map(|k| (0..FEATURE_LEN).map(|i| if (i + k) % 4 == 0 { weight } else { 0.0 }).collect())
        .collect();
    std::fs::write(
        dir.join("scaler.json"),
        json!({"mean": vec![0.0f32; FEATURE_LEN], "scale": vec![1.0f32; FEATURE_LEN]}).to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join("model.json"),
        json!({"weights": weights, "bias": vec![0.0f32; labels.len()]}).to_string(),
    )
    .unwrap();
    std::fs::write(dir.join("labels.json"), json!(labels).to_string()).unwrap();
}

fn classifier(labels: &[&str], weight: f32) -> Arc<EmotionClassifier> {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path(), labels, weight);
    Arc::new(EmotionClassifier::load(dir.path()).unwrap())
}

fn sine(freq: f32, rate: u32, secs: f32) -> Vec<f32> {
    let n = (rate as f32 * secs) as usize;
    (0..n)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
        .collect()
}

#[derive(Default)]
struct CountingSource {
    calls: AtomicUsize,
}

impl AudioSource for CountingSource {
    fn capture(&self, duration: Duration, sample_rate: u32) -> Result<SampleBuffer, AudioError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SampleBuffer::new(sine(440.0, sample_rate, duration.as_secs_f32()), sample_rate)
    }

    fn name(&self) -> String {
        "counting".to_string()
    }
}

/// Fixed detections for every frame
struct Detections(Vec<Region>);

impl FaceLocalizer for Detections {
    fn detect(&self, _frame: &Frame) -> Result<Vec<Region>, VisionError> {
        Ok(self.0.clone())
    }
}

struct AlwaysHappy;

impl ExpressionClassifier for AlwaysHappy {
    fn analyze(&self, _face: &Frame) -> Result<ExpressionOutput, VisionError> {
        let scores = [("happy".to_string(), 0.8), ("neutral".to_string(), 0.2)].into_iter().collect();
        Ok(ExpressionOutput::One(ExpressionAnalysis::new(scores)))
    }
}

/// Yields blank frames until the count runs out
struct BlankFrames(usize);

impl FrameSource for BlankFrames {
    fn read(&mut self) -> Result<Option<Frame>, VisionError> {
        if self.0 == 0 {
            return Ok(None);
        }
        self.0 -= 1;
        Ok(Some(RgbImage::new(64, 64)))
    }
}

struct Stills(usize);

impl FrameSourceFactory for Stills {
    fn open(&self) -> Result<Box<dyn FrameSource>, VisionError> {
        Ok(Box::new(BlankFrames(self.0)))
    }

    fn describe(&self) -> String {
        "stills".to_string()
    }
}

fn build(
    classifier: Option<Arc<EmotionClassifier>>,
    source: Arc<dyn AudioSource>,
    video: Option<VideoPipeline>,
) -> (Arc<EmotionService>, Router) {
    let mut config = SentioConfig::default();
    config.audio.worker.enabled = false;
    config.vision.frame_rate = 100;
    let service = EmotionService::assemble(
        config,
        ServiceParts {
            classifier,
            audio_source: source,
            video,
        },
    )
    .unwrap();
    let app = create_router(service.clone());
    (service, app)
}

fn pipeline(regions: Vec<Region>, frames: usize) -> VideoPipeline {
    VideoPipeline {
        source: Arc::new(Stills(frames)),
        analyzer: FaceAnalyzer::new(Arc::new(Detections(regions)), Arc::new(AlwaysHappy)),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_sine_wave_prediction() {
    let samples = sine(440.0, 22050, 7.0);
    let buffer = SampleBuffer::new(samples.clone(), 22050).unwrap();
    let features = FeatureExtractor::new().extract(&buffer).unwrap();
    assert_eq!(features.as_slice().len(), 26);

    let labels = ["angry", "calm", "happy", "sad"];
    let (_, app) = build(Some(classifier(&labels, 0.05)), Arc::new(CountingSource::default()), None);
    let (status, body) = send(
        &app,
        post_json("/audio/predict_numpy", json!({"audio": samples, "sample_rate": 22050})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    let total: f64 = body["distribution"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_f64().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-3);
    assert!(labels.contains(&body["label"].as_str().unwrap()));
}

#[tokio::test]
async fn test_empty_samples_rejected() {
    let source = Arc::new(CountingSource::default());
    let (service, app) = build(Some(classifier(&["calm", "sad"], 0.05)), source.clone(), None);

    let (status, body) = send(&app, post_json("/audio/predict_numpy", json!({"audio": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No audio data provided");
    assert_eq!(body["label"], "neutral");

    let (status, body) = send(&app, post_json("/audio/predict_numpy", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No audio data provided");

    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    assert!(service.voice_latest().latest().is_none());
}

#[tokio::test]
async fn test_uncertain_posterior_gated_to_neutral() {
    // Ten labels with identical logits give a flat posterior of 0.10
    let labels = ["angry", "calm", "disgust", "fear", "happy", "sad", "surprise", "bored", "tired", "excited"];
    let (_, app) = build(Some(classifier(&labels, 0.0)), Arc::new(CountingSource::default()), None);

    let (status, body) = send(
        &app,
        post_json("/audio/predict_numpy", json!({"audio": sine(300.0, 16000, 1.0), "sample_rate": 16000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "neutral");
    assert!((body["confidence"].as_f64().unwrap() - 0.15).abs() < 1e-6);
    let flat = body["distribution"]["angry"].as_f64().unwrap();
    assert!((flat - 0.1).abs() < 1e-4);
}

#[tokio::test]
async fn test_stopped_loop_keeps_last_snapshot() {
    let regions = vec![Region::new(4, 4, 30, 30), Region::new(32, 4, 60, 30)];
    let (service, app) = build(None, Arc::new(CountingSource::default()), Some(pipeline(regions, 100_000)));

    send(&app, get("/start_camera")).await;
    let response = app.clone().oneshot(get("/video_feed")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let drain = tokio::spawn(async move { axum::body::to_bytes(response.into_body(), usize::MAX).await });

    let registry = service.registry().clone();
    assert!(wait_until(|| registry.len() == 2).await);

    send(&app, get("/stop_camera")).await;
    drain.await.unwrap().unwrap();
    let capture = service.capture().clone();
    assert!(wait_until(|| capture.phase() == LoopPhase::Idle).await);

    let (_, first) = send(&app, get("/emotions")).await;
    let (_, second) = send(&app, get("/emotions")).await;
    assert_eq!(first, second);
    assert_eq!(first.as_object().unwrap().len(), 2);
    assert_eq!(first["1"]["label"], "happy");
}

#[tokio::test]
async fn test_degenerate_detection_skipped() {
    let regions = vec![
        Region::new(4, 4, 30, 30),
        Region::new(40, 10, 40, 40),
        Region::new(34, 34, 60, 60),
    ];
    let detections = regions.len();
    let (_, app) = build(None, Arc::new(CountingSource::default()), Some(pipeline(regions, 1)));

    send(&app, get("/start_camera")).await;
    let response = app.clone().oneshot(get("/video_feed")).await.unwrap();
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let (_, emotions) = send(&app, get("/emotions")).await;
    let entries = emotions.as_object().unwrap();
    assert_eq!(entries.len(), detections - 1);
    assert!(entries.contains_key("0"));
    assert!(!entries.contains_key("1"));
    assert_eq!(emotions["2"]["region"], json!({"x1": 34, "y1": 34, "x2": 60, "y2": 60}));
}

#[tokio::test]
async fn test_missing_artifacts_disable_audio_routes() {
    let dir = tempfile::tempdir().unwrap();
    assert!(EmotionClassifier::load(dir.path()).is_err());

    let source = Arc::new(CountingSource::default());
    let (_, app) = build(None, source.clone(), None);

    let multipart_body = "--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.wav\"\r\n\r\nRIFF\r\n--b--\r\n";
    let requests = vec![
        post_json("/audio/record", json!({})),
        post_json("/audio/predict_numpy", json!({"audio": [0.5, -0.5]})),
        post_json("/audio/predict_numpy", json!({"audio": []})),
        Request::builder()
            .method("POST")
            .uri("/audio/predict_file")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=b")
            .body(Body::from(multipart_body))
            .unwrap(),
        get("/audio/info"),
    ];

    for request in requests {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Detector not initialized");
        assert_eq!(body["code"], "DETECTOR_NOT_INITIALIZED");
    }
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}
