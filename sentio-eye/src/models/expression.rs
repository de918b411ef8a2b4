//! ONNX facial-expression network run through OpenCV's DNN module

use super::frame_to_gray;
use crate::detection::{ExpressionAnalysis, ExpressionClassifier, ExpressionOutput};
use crate::error::VisionError;
use crate::frame::Frame;
use opencv::{
    core::{Mat, Scalar, Size, CV_32F},
    dnn, imgproc,
    prelude::*,
};
use parking_lot::Mutex;
use std::path::Path;
use tracing::info;

/// Square grayscale input edge expected by the network
const INPUT_SIZE: i32 = 64;

pub struct DnnExpressionClassifier {
    net: Mutex<dnn::Net>,
    labels: Vec<String>,
}

impl DnnExpressionClassifier {
    pub fn load(path: &Path, labels: Vec<String>) -> Result<Self, VisionError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VisionError::Model(format!("Invalid model path: {}", path.display())))?;
        let net = dnn::read_net_from_onnx(path_str)
            .map_err(|e| VisionError::Model(format!("Failed to load {}: {}", path.display(), e)))?;
        info!("Loaded expression network from {} ({} labels)", path.display(), labels.len());

        Ok(Self {
            net: Mutex::new(net),
            labels,
        })
    }
}

impl ExpressionClassifier for DnnExpressionClassifier {
    fn analyze(&self, face: &Frame) -> Result<ExpressionOutput, VisionError> {
        let gray = frame_to_gray(face)?;
        let mut resized = Mat::default();
        imgproc::resize(
            &gray,
            &mut resized,
            Size::new(INPUT_SIZE, INPUT_SIZE),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )?;
        let blob = dnn::blob_from_image(
            &resized,
            1.0,
            Size::new(INPUT_SIZE, INPUT_SIZE),
            Scalar::default(),
            false,
            false,
            CV_32F,
        )?;

        let logits: Vec<f32> = {
            let mut net = self.net.lock();
            net.set_input(&blob, "", 1.0, Scalar::default())?;
            let output = net.forward_single("")?;
            output.data_typed::<f32>()?.to_vec()
        };

        if logits.len() != self.labels.len() {
            return Err(VisionError::Model(format!(
                "Network produced {} scores for {} labels",
                logits.len(),
                self.labels.len()
            )));
        }

        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        let scores = self
            .labels
            .iter()
            .cloned()
            .zip(exps.into_iter().map(|e| e / sum))
            .collect();

        Ok(ExpressionOutput::One(ExpressionAnalysis::new(scores)))
    }
}
