//! HTTP routes for capture control, the video stream and voice prediction

use crate::error::ApiError;
use crate::state::EmotionService;
use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart, State,
    },
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use sentio_core::{EmotionObservation, FaceEntry};
use sentio_sc::{RecordOptions, VoiceInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Upper bound on uploaded audio
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub type AppState = Arc<EmotionService>;

pub fn create_router(service: AppState) -> Router {
    let audio_routes = Router::new()
        .route("/audio/record", post(record_handler))
        .route("/audio/predict_file", post(predict_file_handler))
        .route("/audio/predict_numpy", post(predict_numpy_handler))
        .route("/audio/info", get(audio_info_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    Router::new()
        .route("/health", get(health_handler))
        .route("/start_camera", get(start_camera_handler).post(start_camera_handler))
        .route("/stop_camera", get(stop_camera_handler).post(stop_camera_handler))
        .route("/video_feed", get(video_feed_handler))
        .route("/emotions", get(emotions_handler))
        .route("/voice/latest", get(voice_latest_handler))
        .route("/ws", get(crate::ws::websocket_handler))
        .merge(audio_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(service)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Raw-array prediction body. Unknown keys are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplesRequest {
    #[serde(default)]
    pub audio: Vec<f32>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

/// Placeholder label served before the voice worker's first result
pub const LISTENING_LABEL: &str = "listening";

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn start_camera_handler(State(service): State<AppState>) -> Json<StatusResponse> {
    service.capture().start();
    info!("camera started");
    Json(StatusResponse {
        status: "Camera started".to_string(),
    })
}

async fn stop_camera_handler(State(service): State<AppState>) -> Json<StatusResponse> {
    service.capture().stop();
    info!("camera stopped");
    Json(StatusResponse {
        status: "Camera stopped".to_string(),
    })
}

async fn video_feed_handler(State(service): State<AppState>) -> Result<Response, ApiError> {
    let video = service.video().ok_or(ApiError::VideoUnavailable)?;
    let rx = video.start()?;
    let parts = ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>);

    axum::http::Response::builder()
        .header(header::CONTENT_TYPE, video.encoder().content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(parts))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn emotions_handler(State(service): State<AppState>) -> Json<BTreeMap<usize, FaceEntry>> {
    let entries = service
        .registry()
        .snapshot()
        .into_iter()
        .map(|(index, observation)| (index, observation.face_entry()))
        .collect();
    Json(entries)
}

async fn voice_latest_handler(State(service): State<AppState>) -> Response {
    match service.voice_latest().latest() {
        Some(observation) => Json(observation).into_response(),
        None => Json(serde_json::json!({
            "label": LISTENING_LABEL,
            "confidence": 0.0,
        }))
        .into_response(),
    }
}

fn ensure_ready(service: &EmotionService) -> Result<(), ApiError> {
    if service.predictor().is_ready() {
        Ok(())
    } else {
        Err(sentio_sc::AudioError::ClassifierUnavailable.into())
    }
}

async fn record_handler(
    State(service): State<AppState>,
    body: Bytes,
) -> Result<Json<EmotionObservation>, ApiError> {
    ensure_ready(&service)?;
    let options: RecordOptions = if body.iter().all(u8::is_ascii_whitespace) {
        RecordOptions::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid record options: {}", e)))?
    };

    let predictor = service.predictor().clone();
    let observation = tokio::task::spawn_blocking(move || predictor.record(&options)).await??;
    Ok(Json(observation))
}

async fn predict_file_handler(
    State(service): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<EmotionObservation>, ApiError> {
    ensure_ready(&service)?;
    let mut multipart = multipart.map_err(|_| ApiError::BadRequest("No file provided".to_string()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
            upload = Some((file_name, data));
            break;
        }
    }

    let (file_name, data) = upload.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    if file_name.is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }
    info!(file = %file_name, bytes = data.len(), "received audio upload");

    let predictor = service.predictor().clone();
    let observation =
        tokio::task::spawn_blocking(move || predictor.predict_upload(data, Some(&file_name))).await??;
    Ok(Json(observation))
}

async fn predict_numpy_handler(
    State(service): State<AppState>,
    payload: Result<Json<SamplesRequest>, JsonRejection>,
) -> Result<Json<EmotionObservation>, ApiError> {
    ensure_ready(&service)?;
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let predictor = service.predictor().clone();
    let observation =
        tokio::task::spawn_blocking(move || predictor.predict_samples(request.audio, request.sample_rate))
            .await??;
    Ok(Json(observation))
}

async fn audio_info_handler(State(service): State<AppState>) -> Result<Json<VoiceInfo>, ApiError> {
    Ok(Json(service.predictor().info()?))
}
