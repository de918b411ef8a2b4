//! Decoded mono audio with its sample rate

use crate::error::AudioError;

/// Ordered mono samples plus the rate they were captured at.
///
/// Non-finite samples are replaced with silence on construction so nothing
/// downstream has to guard against NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::Format("Sample rate must be greater than 0".to_string()));
        }
        let samples = samples
            .into_iter()
            .map(|s| if s.is_finite() { s } else { 0.0 })
            .collect();
        Ok(Self { samples, sample_rate })
    }

    /// Average interleaved frames down to mono
    pub fn from_interleaved(
        data: &[f32],
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        if channels == 0 {
            return Err(AudioError::Format("Channel count must be greater than 0".to_string()));
        }
        Self::new(downmix(data, channels), sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Channel-average of interleaved frames. A trailing partial frame is dropped.
pub(crate) fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(
            SampleBuffer::new(vec![0.1], 0),
            Err(AudioError::Format(_))
        ));
    }

    #[test]
    fn test_non_finite_samples_silenced() {
        let buf = SampleBuffer::new(vec![0.5, f32::NAN, f32::NEG_INFINITY], 16000).unwrap();
        assert_eq!(buf.samples(), &[0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_stereo_downmix() {
        let buf = SampleBuffer::from_interleaved(&[1.0, 0.0, 0.5, 0.5, 0.2], 2, 8000).unwrap();
        assert_eq!(buf.samples(), &[0.5, 0.5]);
        assert_eq!(buf.duration_secs(), 2.0 / 8000.0);
    }
}
