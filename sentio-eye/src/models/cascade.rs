//! Haar-cascade face localizer

use super::frame_to_gray;
use crate::detection::FaceLocalizer;
use crate::error::VisionError;
use crate::frame::Frame;
use opencv::{
    core::{Rect, Size, Vector},
    imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
};
use parking_lot::Mutex;
use sentio_core::Region;
use std::path::Path;
use tracing::info;

pub struct CascadeFaceLocalizer {
    cascade: Mutex<CascadeClassifier>,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: i32,
}

impl CascadeFaceLocalizer {
    pub fn load(path: &Path) -> Result<Self, VisionError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VisionError::Model(format!("Invalid cascade path: {}", path.display())))?;
        let cascade = CascadeClassifier::new(path_str)
            .map_err(|e| VisionError::Model(format!("Failed to load cascade {}: {}", path.display(), e)))?;
        if cascade.empty().map_err(VisionError::from)? {
            return Err(VisionError::Model(format!("Cascade {} is empty", path.display())));
        }
        info!("Loaded face cascade from {}", path.display());

        Ok(Self {
            cascade: Mutex::new(cascade),
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: 30,
        })
    }
}

impl FaceLocalizer for CascadeFaceLocalizer {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, VisionError> {
        let gray = frame_to_gray(frame)?;
        let mut equalized = Mat::default();
        imgproc::equalize_hist(&gray, &mut equalized)?;

        let mut faces: Vector<Rect> = Vector::new();
        self.cascade.lock().detect_multi_scale(
            &equalized,
            &mut faces,
            self.scale_factor,
            self.min_neighbors,
            0,
            Size::new(self.min_size, self.min_size),
            Size::new(0, 0),
        )?;

        Ok(faces
            .iter()
            .map(|r| Region::from_xywh(r.x, r.y, r.width, r.height))
            .collect())
    }
}
