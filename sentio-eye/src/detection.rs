//! Face localization and expression classification boundary
//!
//! Both collaborators are opaque capability providers. Whatever shape an
//! expression classifier hands back is folded into one `EmotionObservation`
//! right here; nothing past `FaceAnalyzer` sees the raw output.

use crate::error::VisionError;
use crate::frame::{crop, Frame};
use sentio_core::{ConfidenceGate, Distribution, EmotionObservation, Region};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Finds face regions in a whole frame
pub trait FaceLocalizer: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, VisionError>;
}

/// Scores facial expressions on a cropped face
pub trait ExpressionClassifier: Send + Sync {
    fn analyze(&self, face: &Frame) -> Result<ExpressionOutput, VisionError>;
}

/// Per-label scores for one face, as probabilities or percentages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionAnalysis {
    pub scores: BTreeMap<String, f32>,
    /// The classifier's own pick, when it reports one
    pub dominant: Option<String>,
}

impl ExpressionAnalysis {
    pub fn new(scores: BTreeMap<String, f32>) -> Self {
        Self {
            scores,
            dominant: None,
        }
    }

    pub fn with_dominant(mut self, dominant: impl Into<String>) -> Self {
        self.dominant = Some(dominant.into());
        self
    }
}

/// Raw classifier output: a single analysis or a list of them
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionOutput {
    One(ExpressionAnalysis),
    Many(Vec<ExpressionAnalysis>),
}

/// Fixed internal shape of a classified face
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub label: String,
    pub confidence: f32,
    pub distribution: Distribution,
}

impl ExpressionOutput {
    /// Fold either output shape into one `Expression`.
    ///
    /// A list contributes its first element. Scores summing past 1.5 are
    /// read as percentages. The label is the reported dominant one when it
    /// is scored, otherwise the highest score.
    pub fn normalize(self) -> Result<Expression, VisionError> {
        let analysis = match self {
            ExpressionOutput::One(a) => a,
            ExpressionOutput::Many(list) => list
                .into_iter()
                .next()
                .ok_or_else(|| VisionError::Processing("Expression classifier returned no result".to_string()))?,
        };

        let mut distribution: Distribution = analysis
            .scores
            .into_iter()
            .map(|(k, v)| (k, if v.is_finite() { v.max(0.0) } else { 0.0 }))
            .collect();
        if distribution.is_empty() {
            return Err(VisionError::Processing("Expression classifier returned no scores".to_string()));
        }

        let total: f32 = distribution.values().sum();
        if total > 1.5 {
            for v in distribution.values_mut() {
                *v /= 100.0;
            }
        }

        let label = match analysis.dominant {
            Some(d) if distribution.contains_key(&d) => d,
            _ => argmax(&distribution),
        };
        let confidence = distribution.get(&label).copied().unwrap_or(0.0).clamp(0.0, 1.0);

        Ok(Expression {
            label,
            confidence,
            distribution,
        })
    }
}

fn argmax(distribution: &Distribution) -> String {
    let mut best: Option<(&String, f32)> = None;
    for (label, &p) in distribution {
        if best.map_or(true, |(_, b)| p > b) {
            best = Some((label, p));
        }
    }
    best.map(|(l, _)| l.clone()).unwrap_or_default()
}

/// Localizer plus expression classifier, with the confidence gate applied
#[derive(Clone)]
pub struct FaceAnalyzer {
    localizer: Arc<dyn FaceLocalizer>,
    classifier: Arc<dyn ExpressionClassifier>,
    gate: ConfidenceGate,
}

impl std::fmt::Debug for FaceAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceAnalyzer").field("gate", &self.gate).finish()
    }
}

impl FaceAnalyzer {
    pub fn new(localizer: Arc<dyn FaceLocalizer>, classifier: Arc<dyn ExpressionClassifier>) -> Self {
        Self {
            localizer,
            classifier,
            gate: ConfidenceGate::default(),
        }
    }

    /// Raw detections for the whole frame
    pub fn localize(&self, frame: &Frame) -> Result<Vec<Region>, VisionError> {
        let regions = self.localizer.detect(frame)?;
        debug!("Detected {} faces", regions.len());
        Ok(regions)
    }

    /// Classify one detection.
    ///
    /// `None` for a region with no area inside the frame. A classifier
    /// failure yields an `unknown` observation instead of an error.
    pub fn classify(&self, frame: &Frame, region: &Region) -> Option<EmotionObservation> {
        let (clipped, face) = crop(frame, region)?;

        let result = self
            .classifier
            .analyze(&face)
            .and_then(ExpressionOutput::normalize);

        Some(match result {
            Ok(expression) => {
                let (label, confidence) = self.gate.apply(expression.label, expression.confidence);
                EmotionObservation::face(label, confidence, expression.distribution, clipped)
            }
            Err(e) => {
                warn!(error = %e, ?clipped, "expression classification failed");
                EmotionObservation::face_unknown(clipped, e.to_string())
            }
        })
    }
}
