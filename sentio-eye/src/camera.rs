//! USB webcam frame source

use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::frame::{Frame, FrameSource, FrameSourceFactory};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use tracing::{info, warn};

/// Opens the configured camera once per stream
#[derive(Debug, Clone)]
pub struct OpenCvCameraFactory {
    camera_id: u32,
    resolution: (u32, u32),
    frame_rate: u32,
}

impl OpenCvCameraFactory {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            camera_id: config.camera_id,
            resolution: config.resolution,
            frame_rate: config.frame_rate,
        }
    }
}

impl FrameSourceFactory for OpenCvCameraFactory {
    fn open(&self) -> Result<Box<dyn FrameSource>, VisionError> {
        let mut capture = VideoCapture::new(self.camera_id as i32, CAP_ANY)
            .map_err(|e| VisionError::Camera(format!("Failed to open camera {}: {}", self.camera_id, e)))?;

        if !capture
            .is_opened()
            .map_err(|e| VisionError::Camera(format!("Camera {} not opened: {}", self.camera_id, e)))?
        {
            return Err(VisionError::Camera(format!("Camera {} failed to open", self.camera_id)));
        }

        // Drivers may ignore these; a refusal is not fatal
        for (prop, value) in [
            (CAP_PROP_FRAME_WIDTH, f64::from(self.resolution.0)),
            (CAP_PROP_FRAME_HEIGHT, f64::from(self.resolution.1)),
            (CAP_PROP_FPS, f64::from(self.frame_rate)),
        ] {
            if let Err(e) = capture.set(prop, value) {
                warn!("Camera {} rejected property {}: {}", self.camera_id, prop, e);
            }
        }

        info!(
            "Camera {} opened at {}x{} @ {}fps",
            self.camera_id, self.resolution.0, self.resolution.1, self.frame_rate
        );
        Ok(Box::new(OpenCvCamera { capture }))
    }

    fn describe(&self) -> String {
        format!("camera {}", self.camera_id)
    }
}

/// Open capture device; released when dropped
struct OpenCvCamera {
    capture: VideoCapture,
}

impl FrameSource for OpenCvCamera {
    fn read(&mut self) -> Result<Option<Frame>, VisionError> {
        let mut bgr = Mat::default();
        let grabbed = self
            .capture
            .read(&mut bgr)
            .map_err(|e| VisionError::Camera(format!("Camera read error: {}", e)))?;
        if !grabbed || bgr.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let bytes = rgb.data_bytes()?.to_vec();

        Frame::from_raw(width, height, bytes)
            .map(Some)
            .ok_or_else(|| VisionError::Camera("Frame buffer size mismatch".to_string()))
    }
}
