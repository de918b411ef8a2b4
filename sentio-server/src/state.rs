//! The service state object shared by the loops and every handler

use crate::config::SentioConfig;
use crate::error::ServiceError;
use parking_lot::Mutex;
use sentio_core::{CaptureState, EmotionObservation, LatestCell, SharedEmotionRegistry};
use sentio_eye::{FrameCaptureLoop, VideoPipeline};
use sentio_sc::{AudioSource, EmotionClassifier, MicrophoneSource, VoiceBackend, VoicePredictor, VoiceWorker};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Collaborators the service is assembled from
pub struct ServiceParts {
    /// `None` when the classifier artifacts could not be loaded
    pub classifier: Option<Arc<EmotionClassifier>>,
    pub audio_source: Arc<dyn AudioSource>,
    /// `None` when no video back-end is available
    pub video: Option<VideoPipeline>,
}

impl ServiceParts {
    /// Production collaborators for `config`. Load failures are logged and
    /// leave the corresponding part unavailable.
    pub fn from_config(config: &SentioConfig) -> Self {
        let classifier = match EmotionClassifier::load(&config.audio.model_dir) {
            Ok(classifier) => Some(Arc::new(classifier)),
            Err(e) => {
                error!(
                    model_dir = %config.audio.model_dir.display(),
                    error = %e,
                    "voice classifier unavailable, prediction endpoints disabled"
                );
                None
            }
        };

        Self {
            classifier,
            audio_source: Arc::new(MicrophoneSource::new(config.audio.device_name.clone())),
            video: video_pipeline(config),
        }
    }
}

#[cfg(feature = "opencv")]
fn video_pipeline(config: &SentioConfig) -> Option<VideoPipeline> {
    match sentio_eye::opencv_pipeline(&config.vision) {
        Ok(pipeline) => Some(pipeline),
        Err(e) => {
            error!(error = %e, "video pipeline unavailable");
            None
        }
    }
}

#[cfg(not(feature = "opencv"))]
fn video_pipeline(_config: &SentioConfig) -> Option<VideoPipeline> {
    warn!("built without the opencv feature, video stream disabled");
    None
}

/// Capture flag, registry, latest voice result, predictor, video loop and
/// voice worker, with explicit construction and shutdown.
pub struct EmotionService {
    config: SentioConfig,
    capture: Arc<CaptureState>,
    registry: Arc<SharedEmotionRegistry>,
    voice_latest: Arc<LatestCell<EmotionObservation>>,
    predictor: Arc<VoicePredictor>,
    video: Option<Arc<FrameCaptureLoop>>,
    worker: Mutex<Option<VoiceWorker>>,
}

impl std::fmt::Debug for EmotionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmotionService")
            .field("capture", &self.capture)
            .field("predictor", &self.predictor)
            .field("video", &self.video.is_some())
            .field("worker", &*self.worker.lock())
            .finish()
    }
}

impl EmotionService {
    /// Load everything named by `config` and start the voice worker
    pub fn start(config: SentioConfig) -> Result<Arc<Self>, ServiceError> {
        let parts = ServiceParts::from_config(&config);
        Self::assemble(config, parts)
    }

    /// Build from explicit collaborators
    pub fn assemble(config: SentioConfig, parts: ServiceParts) -> Result<Arc<Self>, ServiceError> {
        config.validate()?;

        let capture = Arc::new(CaptureState::new());
        let registry = Arc::new(SharedEmotionRegistry::new());
        let voice_latest = Arc::new(LatestCell::new());

        let predictor = Arc::new(VoicePredictor::new(
            parts.classifier.clone(),
            parts.audio_source.clone(),
            config.audio.prediction.clone(),
        ));

        let video = parts.video.map(|pipeline| {
            Arc::new(FrameCaptureLoop::from_pipeline(
                &config.vision,
                pipeline,
                registry.clone(),
                capture.clone(),
            ))
        });

        let worker = if config.audio.worker.enabled {
            let backend = VoiceBackend::from_classifier(parts.classifier);
            if !backend.is_trained() {
                warn!("no trained voice model, background worker uses heuristic rules");
            }
            Some(VoiceWorker::spawn(
                config.audio.worker.clone(),
                parts.audio_source,
                backend,
                voice_latest.clone(),
            )?)
        } else {
            info!("background voice worker disabled");
            None
        };

        info!(
            voice_ready = predictor.is_ready(),
            video = video.is_some(),
            worker = worker.is_some(),
            "emotion service started"
        );

        Ok(Arc::new(Self {
            config,
            capture,
            registry,
            voice_latest,
            predictor,
            video,
            worker: Mutex::new(worker),
        }))
    }

    pub fn config(&self) -> &SentioConfig {
        &self.config
    }

    pub fn capture(&self) -> &Arc<CaptureState> {
        &self.capture
    }

    pub fn registry(&self) -> &Arc<SharedEmotionRegistry> {
        &self.registry
    }

    pub fn voice_latest(&self) -> &Arc<LatestCell<EmotionObservation>> {
        &self.voice_latest
    }

    pub fn predictor(&self) -> &Arc<VoicePredictor> {
        &self.predictor
    }

    pub fn video(&self) -> Option<&Arc<FrameCaptureLoop>> {
        self.video.as_ref()
    }

    pub fn worker_running(&self) -> bool {
        self.worker.lock().as_ref().map(VoiceWorker::is_running).unwrap_or(false)
    }

    /// Stop capture and join the voice worker. Safe to call more than once.
    pub fn shutdown(&self) {
        self.capture.stop();
        if let Some(mut worker) = self.worker.lock().take() {
            worker.shutdown();
        }
        info!("emotion service stopped");
    }
}
