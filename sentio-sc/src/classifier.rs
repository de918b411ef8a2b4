//! Voice emotion classifier: scaler + decision model + label set

use crate::error::AudioError;
use crate::features::{FeatureVector, FEATURE_LEN};
use sentio_core::{ConfidenceGate, Distribution, EmotionObservation, Source};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;
use tracing::{info, warn};

pub const SCALER_FILE: &str = "scaler.json";
pub const MODEL_FILE: &str = "model.json";
pub const LABELS_FILE: &str = "labels.json";

/// Per-feature standardisation, `(x - mean) / scale`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardScaler {
    fn validate(&self) -> Result<(), AudioError> {
        if self.mean.len() != FEATURE_LEN || self.scale.len() != FEATURE_LEN {
            return Err(AudioError::ModelLoad(format!(
                "Scaler must have {} components (mean {}, scale {})",
                FEATURE_LEN,
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err(AudioError::ModelLoad("Scaler contains non-finite values".to_string()));
        }
        Ok(())
    }

    pub fn transform(&self, features: &FeatureVector) -> [f32; FEATURE_LEN] {
        let mut out = [0.0f32; FEATURE_LEN];
        for (i, (slot, &x)) in out.iter_mut().zip(features.as_slice()).enumerate() {
            // Constant features were fitted with zero spread
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            *slot = (x - self.mean[i]) / scale;
        }
        out
    }
}

/// Produces a posterior over the label set from scaled features
pub trait DecisionModel: Send + Sync + Debug {
    fn n_classes(&self) -> usize;

    fn posterior(&self, scaled: &[f32; FEATURE_LEN]) -> Result<Vec<f32>, AudioError>;
}

/// Multinomial linear model; softmax of `W x + b` is the posterior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSoftmax {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl LinearSoftmax {
    fn validate(&self) -> Result<(), AudioError> {
        if self.weights.is_empty() {
            return Err(AudioError::ModelLoad("Model has no classes".to_string()));
        }
        if self.weights.len() != self.bias.len() {
            return Err(AudioError::ModelLoad(format!(
                "Model has {} weight rows but {} biases",
                self.weights.len(),
                self.bias.len()
            )));
        }
        if let Some(row) = self.weights.iter().find(|row| row.len() != FEATURE_LEN) {
            return Err(AudioError::ModelLoad(format!(
                "Model weight row has {} values, expected {}",
                row.len(),
                FEATURE_LEN
            )));
        }
        Ok(())
    }
}

impl DecisionModel for LinearSoftmax {
    fn n_classes(&self) -> usize {
        self.weights.len()
    }

    fn posterior(&self, scaled: &[f32; FEATURE_LEN]) -> Result<Vec<f32>, AudioError> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, &b)| {
                row.iter()
                    .zip(scaled)
                    .map(|(&w, &x)| f64::from(w) * f64::from(x))
                    .sum::<f64>()
                    + f64::from(b)
            })
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(AudioError::ModelInvocation("Model produced non-finite logits".to_string()));
        }
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        Ok(exps.into_iter().map(|e| (e / total) as f32).collect())
    }
}

/// Scaler, decision model and ordered labels, loaded and swapped as one unit
#[derive(Debug)]
pub struct ClassifierModel {
    scaler: StandardScaler,
    model: Box<dyn DecisionModel>,
    labels: Vec<String>,
}

impl ClassifierModel {
    pub fn new(
        scaler: StandardScaler,
        model: Box<dyn DecisionModel>,
        labels: Vec<String>,
    ) -> Result<Self, AudioError> {
        scaler.validate()?;
        let labels: Vec<String> = labels.into_iter().map(|l| l.trim().to_string()).collect();
        if labels.is_empty() || labels.iter().any(|l| l.is_empty()) {
            return Err(AudioError::ModelLoad("Label set must be non-empty".to_string()));
        }
        if model.n_classes() != labels.len() {
            return Err(AudioError::ModelLoad(format!(
                "Model has {} classes but {} labels",
                model.n_classes(),
                labels.len()
            )));
        }
        Ok(Self { scaler, model, labels })
    }

    /// Load `scaler.json`, `model.json` and `labels.json` from `dir`.
    /// Any missing or inconsistent artifact fails the whole load.
    pub fn load(dir: &Path) -> Result<Self, AudioError> {
        let scaler: StandardScaler = read_artifact(dir, SCALER_FILE)?;
        let model: LinearSoftmax = read_artifact(dir, MODEL_FILE)?;
        let labels: Vec<String> = read_artifact(dir, LABELS_FILE)?;
        model.validate()?;
        Self::new(scaler, Box::new(model), labels)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

fn read_artifact<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T, AudioError> {
    let path = dir.join(name);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| AudioError::ModelLoad(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| AudioError::ModelLoad(format!("{}: {}", path.display(), e)))
}

/// Trained voice classifier with the confidence gate applied to its output
#[derive(Debug)]
pub struct EmotionClassifier {
    model: ClassifierModel,
    gate: ConfidenceGate,
}

impl EmotionClassifier {
    pub fn new(model: ClassifierModel) -> Self {
        Self {
            model,
            gate: ConfidenceGate::default(),
        }
    }

    pub fn load(dir: &Path) -> Result<Self, AudioError> {
        let model = ClassifierModel::load(dir)?;
        info!(
            model_dir = %dir.display(),
            labels = ?model.labels(),
            "loaded voice classifier"
        );
        Ok(Self::new(model))
    }

    pub fn labels(&self) -> &[String] {
        self.model.labels()
    }

    /// Classify one feature vector. Model failures come back as a degraded
    /// observation carrying the error message.
    pub fn predict(&self, features: &FeatureVector) -> EmotionObservation {
        match self.posterior(features) {
            Ok(posterior) => self.observe(posterior),
            Err(e) => {
                warn!(error = %e, "voice classifier invocation failed");
                EmotionObservation::degraded(Source::Voice, e.to_string())
            }
        }
    }

    fn posterior(&self, features: &FeatureVector) -> Result<Vec<f32>, AudioError> {
        let scaled = self.model.scaler.transform(features);
        let posterior = self.model.model.posterior(&scaled)?;
        if posterior.len() != self.model.labels.len() {
            return Err(AudioError::ModelInvocation(format!(
                "Posterior has {} entries for {} labels",
                posterior.len(),
                self.model.labels.len()
            )));
        }
        if posterior.iter().any(|p| !p.is_finite()) {
            return Err(AudioError::ModelInvocation("Posterior contains non-finite values".to_string()));
        }
        Ok(posterior)
    }

    fn observe(&self, posterior: Vec<f32>) -> EmotionObservation {
        // First maximum wins on ties
        let (best, confidence) = posterior
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &p)| {
                if p > bv {
                    (i, p)
                } else {
                    (bi, bv)
                }
            });

        let distribution: Distribution = self
            .model
            .labels
            .iter()
            .cloned()
            .zip(posterior)
            .collect();

        let (label, confidence) = self.gate.apply(self.model.labels[best].clone(), confidence);
        EmotionObservation::voice(label, confidence, distribution)
    }
}
