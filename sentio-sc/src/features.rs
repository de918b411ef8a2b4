//! Fixed-length voice feature vectors

use crate::buffer::SampleBuffer;
use crate::error::AudioError;
use crate::spectral::{self, Stft, HOP_LENGTH, N_FFT};
use tracing::debug;

/// Cepstral coefficients in the vector
pub const N_MFCC: usize = 13;

/// Chroma coefficients in the vector
pub const N_CHROMA: usize = spectral::N_CHROMA;

/// Total feature count: cepstral, chroma, zero-crossing rate
pub const FEATURE_LEN: usize = N_MFCC + N_CHROMA + 1;

/// Silence threshold below the loudest frame
pub const TRIM_TOP_DB: f64 = 25.0;

/// `[mfcc(13), chroma(12), zcr(1)]`, all finite
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    /// Build from raw values; non-finite entries become 0
    pub fn from_array(values: [f32; FEATURE_LEN]) -> Self {
        Self(values.map(|v| if v.is_finite() { v } else { 0.0 }))
    }

    pub fn from_slice(values: &[f32]) -> Result<Self, AudioError> {
        let array: [f32; FEATURE_LEN] = values.try_into().map_err(|_| {
            AudioError::Format(format!(
                "Feature vector must have {} values, got {}",
                FEATURE_LEN,
                values.len()
            ))
        })?;
        Ok(Self::from_array(array))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn mfcc(&self) -> &[f32] {
        &self.0[..N_MFCC]
    }

    pub fn chroma(&self) -> &[f32] {
        &self.0[N_MFCC..N_MFCC + N_CHROMA]
    }

    pub fn zero_crossing_rate(&self) -> f32 {
        self.0[FEATURE_LEN - 1]
    }
}

/// Deterministic sample buffer -> feature vector transform.
///
/// Trims silence 25 dB below the loudest frame, peak-normalises, then
/// averages 13 cepstral coefficients, 12 chroma coefficients and the
/// zero-crossing rate over 2048-sample frames with a 512-sample hop.
#[derive(Debug, Default)]
pub struct FeatureExtractor {
    stft: Stft,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract(&self, buffer: &SampleBuffer) -> Result<FeatureVector, AudioError> {
        let range = spectral::nonsilent_range(buffer.samples(), TRIM_TOP_DB, N_FFT, HOP_LENGTH);
        if range.is_empty() {
            return Err(AudioError::Extraction(
                "Audio is empty after trimming silence".to_string(),
            ));
        }

        let mut samples = buffer.samples()[range.clone()].to_vec();
        spectral::peak_normalize(&mut samples);

        let rate = buffer.sample_rate();
        let power = self.stft.power(&samples);
        let mfcc = spectral::mfcc_means(&power, rate, N_MFCC);
        let chroma = spectral::chroma_means(&power, rate);
        let zcr = spectral::zero_crossing_rate(&samples, N_FFT, HOP_LENGTH);

        let mut values = [0.0f32; FEATURE_LEN];
        for (slot, v) in values
            .iter_mut()
            .zip(mfcc.into_iter().chain(chroma).chain(std::iter::once(zcr)))
        {
            *slot = v as f32;
        }

        debug!(
            input_samples = buffer.len(),
            trimmed_start = range.start,
            trimmed_end = range.end,
            frames = power.len(),
            sample_rate = rate,
            "extracted voice features"
        );

        Ok(FeatureVector::from_array(values))
    }
}
