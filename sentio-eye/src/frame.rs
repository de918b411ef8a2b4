//! Frames and the sources that produce them

use crate::error::VisionError;
use image::RgbImage;
use sentio_core::Region;

/// One decoded RGB video frame
pub type Frame = RgbImage;

/// Blocking, sequential frame reader.
///
/// `Ok(None)` means the source is exhausted; the capture loop treats it
/// the same as a read error and stops.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>, VisionError>;
}

/// Opens a fresh frame source for each stream
pub trait FrameSourceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, VisionError>;

    fn describe(&self) -> String;
}

/// Copy out the part of `frame` covered by `region`.
///
/// The region is clipped to the frame first; `None` when nothing is left.
pub fn crop(frame: &Frame, region: &Region) -> Option<(Region, Frame)> {
    let clipped = region.clip(frame.width(), frame.height());
    if clipped.is_empty() {
        return None;
    }
    let view = image::imageops::crop_imm(
        frame,
        clipped.x1 as u32,
        clipped.y1 as u32,
        clipped.width(),
        clipped.height(),
    );
    Some((clipped, view.to_image()))
}

/// Replays a fixed list of frames, then reports exhaustion
#[derive(Debug, Clone, Default)]
pub struct StillFrames {
    frames: std::collections::VecDeque<Frame>,
}

impl StillFrames {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for StillFrames {
    fn read(&mut self) -> Result<Option<Frame>, VisionError> {
        Ok(self.frames.pop_front())
    }
}
