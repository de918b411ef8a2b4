//! Low-confidence floor applied after every classifier call

use crate::observation::NEUTRAL_LABEL;

/// Posterior maxima below this value are replaced by a neutral result
/// pinned at exactly this confidence.
pub const CONFIDENCE_FLOOR: f32 = 0.15;

/// Confidence gate. Overrides the label only; the distribution a caller
/// holds is never re-normalised.
#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    threshold: f32,
    fallback_label: String,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self {
            threshold: CONFIDENCE_FLOOR,
            fallback_label: NEUTRAL_LABEL.to_string(),
        }
    }
}

impl ConfidenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Returns the gated `(label, confidence)` pair
    pub fn apply(&self, label: String, confidence: f32) -> (String, f32) {
        let confidence = if confidence.is_finite() { confidence } else { 0.0 };
        if confidence < self.threshold {
            (self.fallback_label.clone(), self.threshold)
        } else {
            (label, confidence)
        }
    }

    pub fn is_gated(&self, confidence: f32) -> bool {
        !confidence.is_finite() || confidence < self.threshold
    }
}
