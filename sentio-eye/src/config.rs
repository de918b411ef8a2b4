//! Configuration for sentio-eye

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Labels of the default facial-expression network, in output order
pub const DEFAULT_EXPRESSION_LABELS: [&str; 7] =
    ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];

/// Vision pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Camera device index (0, 1, 2, etc.)
    pub camera_id: u32,
    /// Target frame rate (frames per second)
    pub frame_rate: u32,
    /// Camera resolution (width, height)
    pub resolution: (u32, u32),
    /// JPEG quality of streamed frames (1-100)
    pub jpeg_quality: u8,
    /// Multipart boundary token
    pub boundary: String,
    /// Haar cascade used for face localization
    pub cascade_path: PathBuf,
    /// ONNX facial-expression network
    pub expression_model_path: PathBuf,
    /// Output labels of the expression network, in order
    pub expression_labels: Vec<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        let model_path = dirs::home_dir()
            .map(|mut p| {
                p.push(".sentio");
                p.push("models");
                p
            })
            .unwrap_or_else(|| PathBuf::from("./models"));

        Self {
            camera_id: 0,
            frame_rate: 30,
            resolution: (640, 480),
            jpeg_quality: 80,
            boundary: "frame".to_string(),
            cascade_path: model_path.join("haarcascade_frontalface_default.xml"),
            expression_model_path: model_path.join("emotion-ferplus.onnx"),
            expression_labels: DEFAULT_EXPRESSION_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl VisionConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_rate == 0 || self.frame_rate > 120 {
            return Err("Frame rate must be between 1 and 120".to_string());
        }

        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            return Err("Resolution must be non-zero".to_string());
        }

        if self.resolution.0 > 7680 || self.resolution.1 > 4320 {
            return Err("Resolution too large (max 8K)".to_string());
        }

        if self.camera_id > 100 {
            return Err("Camera ID too large (max 100)".to_string());
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }

        // RFC 2046 boundary: 1-70 characters, no whitespace or CR/LF
        if self.boundary.is_empty()
            || self.boundary.len() > 70
            || self.boundary.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return Err("Boundary must be 1-70 printable characters without whitespace".to_string());
        }

        if self.expression_labels.is_empty() {
            return Err("At least one expression label is required".to_string());
        }

        Ok(())
    }

    /// Delay between frames at the configured rate
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }
}
