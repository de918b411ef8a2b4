//! Box-and-label annotation of classified faces

use crate::frame::Frame;
use image::Rgb;
use sentio_core::{EmotionObservation, Region};
#[cfg(feature = "opencv")]
use tracing::warn;

const CONFIDENT: Rgb<u8> = Rgb([0, 255, 0]);
const UNSURE: Rgb<u8> = Rgb([255, 165, 0]);
const LINE_WIDTH: u32 = 2;
const GLYPH_SCALE: u32 = 2;

/// Box colour for a confidence: green above one half, orange otherwise
pub fn color_for(confidence: f32) -> Rgb<u8> {
    if confidence > 0.5 {
        CONFIDENT
    } else {
        UNSURE
    }
}

/// Caption drawn above a face box
pub fn caption(observation: &EmotionObservation) -> String {
    format!(
        "{} ({:.0}%)",
        observation.label(),
        observation.confidence() * 100.0
    )
}

/// Draw the observation's box and caption in place
#[cfg(not(feature = "opencv"))]
pub fn annotate(frame: &mut Frame, observation: &EmotionObservation) {
    annotate_bitmap(frame, observation);
}

/// Draw the observation's box and caption in place with OpenCV's Hershey
/// font. Frames OpenCV cannot draw on get the built-in font instead.
#[cfg(feature = "opencv")]
pub fn annotate(frame: &mut Frame, observation: &EmotionObservation) {
    if let Err(e) = cv::annotate(frame, observation) {
        warn!(error = %e, "opencv overlay failed, falling back to bitmap font");
        annotate_bitmap(frame, observation);
    }
}

/// Box and caption drawn with the built-in 3x5 font
pub fn annotate_bitmap(frame: &mut Frame, observation: &EmotionObservation) {
    let Some(region) = observation.region() else {
        return;
    };
    let color = color_for(observation.confidence());
    draw_box(frame, &region, color);

    let glyph_h = 5 * GLYPH_SCALE as i32;
    let text_y = if region.y1 >= glyph_h + 4 {
        region.y1 - glyph_h - 4
    } else {
        region.y2 + 4
    };
    draw_text(frame, region.x1, text_y, &caption(observation), color);
}

#[cfg(feature = "opencv")]
mod cv {
    use super::{caption, color_for, LINE_WIDTH};
    use crate::error::VisionError;
    use crate::frame::Frame;
    use image::Rgb;
    use opencv::{
        core::{Point, Rect, Scalar},
        imgproc,
        prelude::*,
    };
    use sentio_core::EmotionObservation;

    const FONT_SCALE: f64 = 0.6;

    /// Draws on a copy and only writes back once every call succeeded
    pub(super) fn annotate(frame: &mut Frame, observation: &EmotionObservation) -> Result<(), VisionError> {
        let Some(region) = observation.region() else {
            return Ok(());
        };
        let r = region.clip(frame.width(), frame.height());
        if r.is_empty() {
            return Ok(());
        }

        let mut mat = {
            let flat = Mat::from_slice(frame.as_raw())?;
            let rgb = flat.reshape(3, frame.height() as i32)?;
            rgb.try_clone()?
        };

        // The Mat keeps the frame's RGB channel order
        let Rgb([red, green, blue]) = color_for(observation.confidence());
        let color = Scalar::new(f64::from(red), f64::from(green), f64::from(blue), 0.0);

        imgproc::rectangle(
            &mut mat,
            Rect::new(r.x1, r.y1, r.width() as i32, r.height() as i32),
            color,
            LINE_WIDTH as i32,
            imgproc::LINE_8,
            0,
        )?;

        let baseline = if r.y1 > 20 { r.y1 - 10 } else { r.y2 + 20 };
        imgproc::put_text(
            &mut mat,
            &caption(observation),
            Point::new(r.x1, baseline),
            imgproc::FONT_HERSHEY_SIMPLEX,
            FONT_SCALE,
            color,
            LINE_WIDTH as i32,
            imgproc::LINE_8,
            false,
        )?;

        let drawn = mat.data_bytes()?;
        let raw: &mut [u8] = &mut **frame;
        if drawn.len() != raw.len() {
            return Err(VisionError::OpenCv("Annotated frame changed size".to_string()));
        }
        raw.copy_from_slice(drawn);
        Ok(())
    }
}

/// Hollow rectangle, clipped to the frame
pub fn draw_box(frame: &mut Frame, region: &Region, color: Rgb<u8>) {
    let r = region.clip(frame.width(), frame.height());
    if r.is_empty() {
        return;
    }
    let (x1, y1, x2, y2) = (r.x1 as u32, r.y1 as u32, r.x2 as u32, r.y2 as u32);
    let w = LINE_WIDTH.min(r.width()).min(r.height());

    fill(frame, x1, y1, x2, y1 + w, color);
    fill(frame, x1, y2 - w, x2, y2, color);
    fill(frame, x1, y1, x1 + w, y2, color);
    fill(frame, x2 - w, y1, x2, y2, color);
}

fn fill(frame: &mut Frame, x1: u32, y1: u32, x2: u32, y2: u32, color: Rgb<u8>) {
    for y in y1..y2.min(frame.height()) {
        for x in x1..x2.min(frame.width()) {
            frame.put_pixel(x, y, color);
        }
    }
}

/// Render `text` with the built-in 3x5 font; off-frame pixels are dropped
pub fn draw_text(frame: &mut Frame, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let advance = (4 * GLYPH_SCALE) as i32;
    for (i, ch) in text.chars().enumerate() {
        let origin_x = x + i as i32 * advance;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        let px = origin_x + (col * GLYPH_SCALE + dx) as i32;
                        let py = y + (row as u32 * GLYPH_SCALE + dy) as i32;
                        if px >= 0 && py >= 0 && (px as u32) < frame.width() && (py as u32) < frame.height() {
                            frame.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

/// Rows of a 3x5 glyph, high bit on the left
fn glyph(ch: char) -> [u8; 5] {
    match ch.to_ascii_uppercase() {
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b110, 0b001, 0b010, 0b100, 0b111],
        '3' => [0b110, 0b001, 0b010, 0b001, 0b110],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b110, 0b001, 0b110],
        '6' => [0b011, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b110],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '(' => [0b010, 0b100, 0b100, 0b100, 0b010],
        ')' => [0b010, 0b001, 0b001, 0b001, 0b010],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ' ' => [0; 5],
        _ => [0b110, 0b001, 0b010, 0b000, 0b010],
    }
}
