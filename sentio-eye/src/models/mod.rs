//! OpenCV-backed face localizer and expression classifier

pub mod cascade;
pub mod expression;

pub use cascade::CascadeFaceLocalizer;
pub use expression::DnnExpressionClassifier;

use crate::error::VisionError;
use crate::frame::Frame;
use opencv::{core::Mat, imgproc, prelude::*};

/// RGB frame to an owned single-channel grayscale `Mat`
pub(crate) fn frame_to_gray(frame: &Frame) -> Result<Mat, VisionError> {
    let flat = Mat::from_slice(frame.as_raw())
        .map_err(|e| VisionError::OpenCv(format!("Failed to wrap frame: {}", e)))?;
    let rgb = flat
        .reshape(3, frame.height() as i32)
        .map_err(|e| VisionError::OpenCv(format!("Failed to reshape frame: {}", e)))?;
    let mut gray = Mat::default();
    imgproc::cvt_color(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY, 0)
        .map_err(|e| VisionError::OpenCv(format!("Failed to convert color: {}", e)))?;
    Ok(gray)
}
