//! The video loop: read, localize, classify, annotate, encode, emit

use crate::config::VisionConfig;
use crate::detection::FaceAnalyzer;
use crate::error::VisionError;
use crate::frame::{Frame, FrameSourceFactory};
use crate::overlay::annotate;
use crate::stream::StreamEncoder;
use bytes::Bytes;
use sentio_core::{CaptureState, LoopGuard, SharedEmotionRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Encoded parts buffered ahead of a slow client
const FRAME_BUFFER_SIZE: usize = 4;

/// Frame source plus face analysis, before it is bound to shared state
#[derive(Clone)]
pub struct VideoPipeline {
    pub source: Arc<dyn FrameSourceFactory>,
    pub analyzer: FaceAnalyzer,
}

impl std::fmt::Debug for VideoPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoPipeline")
            .field("source", &self.source.describe())
            .field("analyzer", &self.analyzer)
            .finish()
    }
}

/// Drives one video stream at a time.
///
/// Each `start` claims the single loop slot on `CaptureState`, opens a new
/// frame source and runs on a blocking thread until capture is stopped,
/// the source runs dry or the stream's receiver is dropped.
pub struct FrameCaptureLoop {
    factory: Arc<dyn FrameSourceFactory>,
    analyzer: FaceAnalyzer,
    encoder: StreamEncoder,
    registry: Arc<SharedEmotionRegistry>,
    state: Arc<CaptureState>,
    frame_interval: Duration,
}

impl std::fmt::Debug for FrameCaptureLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCaptureLoop")
            .field("source", &self.factory.describe())
            .field("encoder", &self.encoder)
            .field("frame_interval", &self.frame_interval)
            .finish()
    }
}

impl FrameCaptureLoop {
    pub fn new(
        config: &VisionConfig,
        factory: Arc<dyn FrameSourceFactory>,
        analyzer: FaceAnalyzer,
        registry: Arc<SharedEmotionRegistry>,
        state: Arc<CaptureState>,
    ) -> Self {
        Self {
            factory,
            analyzer,
            encoder: StreamEncoder::new(config.boundary.clone(), config.jpeg_quality),
            registry,
            state,
            frame_interval: config.frame_interval(),
        }
    }

    pub fn from_pipeline(
        config: &VisionConfig,
        pipeline: VideoPipeline,
        registry: Arc<SharedEmotionRegistry>,
        state: Arc<CaptureState>,
    ) -> Self {
        Self::new(config, pipeline.source, pipeline.analyzer, registry, state)
    }

    pub fn encoder(&self) -> &StreamEncoder {
        &self.encoder
    }

    /// Start a stream of multipart units.
    ///
    /// Fails with `StreamBusy` while another stream holds the loop slot.
    /// When capture is inactive the stream ends without any parts.
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<mpsc::Receiver<Bytes>, VisionError> {
        let guard = self.state.enter().ok_or(VisionError::StreamBusy)?;
        let (tx, rx) = mpsc::channel(FRAME_BUFFER_SIZE);
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            this.run(guard, tx);
        });
        Ok(rx)
    }

    /// Blocking loop body; returns the number of parts emitted
    pub fn run(&self, guard: LoopGuard, tx: mpsc::Sender<Bytes>) -> usize {
        if !guard.should_continue() {
            debug!("capture inactive, stream ends immediately");
            return 0;
        }

        let mut source = match self.factory.open() {
            Ok(source) => source,
            Err(e) => {
                error!(source = %self.factory.describe(), error = %e, "failed to open frame source");
                return 0;
            }
        };
        info!(source = %self.factory.describe(), "video stream started");

        let mut emitted = 0usize;
        while guard.should_continue() {
            let started = Instant::now();

            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("frame source exhausted");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "frame read failed, ending stream");
                    break;
                }
            };

            match self.process_frame(frame) {
                Ok(part) => {
                    if tx.blocking_send(part).is_err() {
                        info!("stream receiver dropped");
                        break;
                    }
                    emitted += 1;
                }
                Err(e) => warn!(frame = emitted, error = %e, "dropping frame"),
            }

            let elapsed = started.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }

        info!(frames = emitted, "video stream stopped");
        emitted
    }

    /// Reset the registry, classify every detection, annotate and encode.
    ///
    /// A localizer failure leaves the frame unannotated. Registry keys are
    /// raw detection indices, so skipped regions leave gaps.
    pub fn process_frame(&self, mut frame: Frame) -> Result<Bytes, VisionError> {
        self.registry.reset();

        match self.analyzer.localize(&frame) {
            Ok(regions) => {
                let observations: Vec<_> = regions
                    .iter()
                    .enumerate()
                    .filter_map(|(index, region)| {
                        let observation = self.analyzer.classify(&frame, region);
                        if observation.is_none() {
                            debug!(index, ?region, "skipping zero-area detection");
                        }
                        observation.map(|o| (index, o))
                    })
                    .collect();

                for (index, observation) in observations {
                    annotate(&mut frame, &observation);
                    self.registry.put(index, observation);
                }
            }
            Err(e) => warn!(error = %e, "face localization failed, frame passes through"),
        }

        self.encoder.encode(&frame)
    }
}
