//! sentio-eye: face expression capture for sentio
//!
//! Reads frames from a camera, localizes faces, classifies each face's
//! expression and publishes the results into the shared emotion registry,
//! while emitting the annotated frames as a multipart JPEG stream.
//!
//! The face localizer and expression classifier are opaque collaborators
//! behind traits. OpenCV implementations of both, plus the camera source,
//! are available with the `opencv` feature.

pub mod error;
pub mod config;
pub mod frame;
pub mod detection;
pub mod overlay;
pub mod stream;
pub mod capture_loop;
#[cfg(feature = "opencv")]
pub mod camera;
#[cfg(feature = "opencv")]
pub mod models;

pub use error::VisionError;
pub use config::VisionConfig;
pub use frame::{crop, Frame, FrameSource, FrameSourceFactory, StillFrames};
pub use detection::{
    Expression, ExpressionAnalysis, ExpressionClassifier, ExpressionOutput, FaceAnalyzer, FaceLocalizer,
};
pub use stream::StreamEncoder;
pub use capture_loop::{FrameCaptureLoop, VideoPipeline};

#[cfg(feature = "opencv")]
pub use camera::OpenCvCameraFactory;
#[cfg(feature = "opencv")]
pub use models::{CascadeFaceLocalizer, DnnExpressionClassifier};

/// Camera, cascade and expression network from `config`
#[cfg(feature = "opencv")]
pub fn opencv_pipeline(config: &VisionConfig) -> Result<VideoPipeline, VisionError> {
    use std::sync::Arc;

    config.validate().map_err(VisionError::Config)?;
    let localizer = CascadeFaceLocalizer::load(&config.cascade_path)?;
    let classifier =
        DnnExpressionClassifier::load(&config.expression_model_path, config.expression_labels.clone())?;

    Ok(VideoPipeline {
        source: Arc::new(OpenCvCameraFactory::new(config)),
        analyzer: FaceAnalyzer::new(Arc::new(localizer), Arc::new(classifier)),
    })
}
