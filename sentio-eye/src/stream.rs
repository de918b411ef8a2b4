//! Multipart JPEG stream framing

use crate::error::VisionError;
use crate::frame::Frame;
use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

/// Encodes annotated frames as parts of a `multipart/x-mixed-replace` body
#[derive(Debug, Clone)]
pub struct StreamEncoder {
    boundary: String,
    quality: u8,
}

impl StreamEncoder {
    pub fn new(boundary: impl Into<String>, quality: u8) -> Self {
        Self {
            boundary: boundary.into(),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value of the response `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.boundary)
    }

    /// JPEG-encode one frame
    pub fn encode_jpeg(&self, frame: &Frame) -> Result<Vec<u8>, VisionError> {
        let mut jpeg = Vec::with_capacity(frame.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(frame.as_raw(), frame.width(), frame.height(), ColorType::Rgb8)
            .map_err(|e| VisionError::Encode(format!("JPEG encoding failed: {}", e)))?;
        Ok(jpeg)
    }

    /// Wrap already-encoded JPEG bytes in one multipart unit
    pub fn frame_part(&self, jpeg: &[u8]) -> Bytes {
        let header = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            self.boundary,
            jpeg.len()
        );
        let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
        part.put_slice(header.as_bytes());
        part.put_slice(jpeg);
        part.put_slice(b"\r\n");
        part.freeze()
    }

    /// Encode and frame in one step
    pub fn encode(&self, frame: &Frame) -> Result<Bytes, VisionError> {
        let jpeg = self.encode_jpeg(frame)?;
        Ok(self.frame_part(&jpeg))
    }
}

impl Default for StreamEncoder {
    fn default() -> Self {
        Self::new("frame", 80)
    }
}
