//! Emotion observations produced by the face and voice classifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label used by the confidence gate and by every degraded result
pub const NEUTRAL_LABEL: &str = "neutral";

/// Label recorded for a face whose expression could not be classified
pub const UNKNOWN_LABEL: &str = "unknown";

/// Label -> probability. Keys are exactly the classifier's label set.
pub type Distribution = BTreeMap<String, f32>;

/// Which modality produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Face,
    Voice,
}

/// Axis-aligned pixel region, `(x1, y1)` inclusive and `(x2, y2)` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from an origin and a size, as most detectors report boxes
    pub fn from_xywh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self::new(x, y, x.saturating_add(w), y.saturating_add(h))
    }

    pub fn width(&self) -> u32 {
        (i64::from(self.x2) - i64::from(self.x1)).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (i64::from(self.y2) - i64::from(self.y1)).max(0) as u32
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Degenerate boxes (x2 <= x1 or y2 <= y1) have zero area
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Clamp the region to a `width` x `height` frame
    pub fn clip(&self, width: u32, height: u32) -> Region {
        let max_x = i32::try_from(width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height).unwrap_or(i32::MAX);
        Region {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        }
    }
}

/// One classifier result. Constructed once per inference call and never
/// mutated afterwards; a newer observation replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionObservation {
    label: String,
    confidence: f32,
    distribution: Distribution,
    source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    region: Option<Region>,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl EmotionObservation {
    /// Voice observation from a classifier posterior
    pub fn voice(label: impl Into<String>, confidence: f32, distribution: Distribution) -> Self {
        Self::build(label.into(), confidence, distribution, Source::Voice, None, None)
    }

    /// Face observation for one detected region
    pub fn face(
        label: impl Into<String>,
        confidence: f32,
        distribution: Distribution,
        region: Region,
    ) -> Self {
        Self::build(label.into(), confidence, distribution, Source::Face, Some(region), None)
    }

    /// A face whose expression classification failed
    pub fn face_unknown(region: Region, error: impl Into<String>) -> Self {
        Self::build(
            UNKNOWN_LABEL.to_string(),
            0.0,
            Distribution::new(),
            Source::Face,
            Some(region),
            Some(error.into()),
        )
    }

    /// No usable result for this source; replaces any earlier one
    pub fn unknown(source: Source, error: impl Into<String>) -> Self {
        Self::build(
            UNKNOWN_LABEL.to_string(),
            0.0,
            Distribution::new(),
            source,
            None,
            Some(error.into()),
        )
    }

    /// Neutral, zero-confidence result carrying the failure message
    pub fn degraded(source: Source, error: impl Into<String>) -> Self {
        Self::build(
            NEUTRAL_LABEL.to_string(),
            0.0,
            Distribution::new(),
            source,
            None,
            Some(error.into()),
        )
    }

    fn build(
        label: String,
        confidence: f32,
        distribution: Distribution,
        source: Source,
        region: Option<Region>,
        error: Option<String>,
    ) -> Self {
        let distribution = distribution
            .into_iter()
            .map(|(k, v)| (k, if v.is_finite() { v } else { 0.0 }))
            .collect();
        Self {
            label,
            confidence: sanitize_confidence(confidence),
            distribution,
            source,
            region,
            timestamp: Utc::now(),
            error,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Projection served by the latest-emotions query
    pub fn face_entry(&self) -> FaceEntry {
        FaceEntry {
            label: self.label.clone(),
            confidence: self.confidence,
            region: self.region,
        }
    }
}

fn sanitize_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// `{label, confidence, region}` view of a face observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEntry {
    pub label: String,
    pub confidence: f32,
    pub region: Option<Region>,
}
