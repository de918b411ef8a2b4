//! Energy / pitch / zero-crossing fallback when no trained model is loaded

use crate::buffer::SampleBuffer;
use crate::spectral::{self, HOP_LENGTH, N_FFT};
use sentio_core::{ConfidenceGate, Distribution, EmotionObservation, UNKNOWN_LABEL};

/// Labels the fallback can emit
pub const HEURISTIC_LABELS: [&str; 4] = ["angry", "happy", "sad", "neutral"];

const FRAME: usize = 1024;
const HOP: usize = 512;
const PITCH_MIN_HZ: f64 = 50.0;
const PITCH_MAX_HZ: f64 = 500.0;

/// Coarse rule-based classifier over raw chunk statistics
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    pub loud_rms: f64,
    pub quiet_rms: f64,
    pub high_pitch_hz: f64,
    pub low_pitch_hz: f64,
    pub noisy_zcr: f64,
    gate: ConfidenceGate,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            loud_rms: 0.04,
            quiet_rms: 0.01,
            high_pitch_hz: 160.0,
            low_pitch_hz: 120.0,
            noisy_zcr: 0.15,
            gate: ConfidenceGate::default(),
        }
    }
}

/// Statistics the rules look at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkStats {
    pub rms: f64,
    pub pitch_hz: f64,
    pub zcr: f64,
}

impl ChunkStats {
    pub fn measure(buffer: &SampleBuffer) -> Self {
        let samples = buffer.samples();
        let rms_frames = spectral::frame_rms(samples, FRAME, HOP);
        let rms = rms_frames.iter().sum::<f64>() / rms_frames.len() as f64;

        let mut pitches: Vec<f64> = samples
            .windows(FRAME)
            .step_by(HOP)
            .filter_map(|frame| {
                spectral::autocorrelation_pitch(frame, buffer.sample_rate(), PITCH_MIN_HZ, PITCH_MAX_HZ)
            })
            .collect();
        let pitch_hz = median(&mut pitches).unwrap_or(0.0);

        let zcr = spectral::zero_crossing_rate(samples, N_FFT, HOP_LENGTH);

        Self { rms, pitch_hz, zcr }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_for(&self, stats: &ChunkStats) -> &'static str {
        if stats.rms > self.loud_rms && stats.pitch_hz > self.high_pitch_hz {
            if stats.zcr > self.noisy_zcr {
                "angry"
            } else {
                "happy"
            }
        } else if stats.rms < self.quiet_rms && stats.pitch_hz < self.low_pitch_hz {
            "sad"
        } else {
            "neutral"
        }
    }

    /// One-hot observation over the fixed label set; an empty chunk is
    /// reported as unknown with zero confidence
    pub fn classify(&self, buffer: &SampleBuffer) -> EmotionObservation {
        if buffer.is_empty() {
            return EmotionObservation::voice(UNKNOWN_LABEL, 0.0, Distribution::new());
        }

        let stats = ChunkStats::measure(buffer);
        let winner = self.label_for(&stats);
        let distribution: Distribution = HEURISTIC_LABELS
            .iter()
            .map(|&l| (l.to_string(), if l == winner { 1.0 } else { 0.0 }))
            .collect();

        let (label, confidence) = self.gate.apply(winner.to_string(), 1.0);
        EmotionObservation::voice(label, confidence, distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(freq: f64, amp: f32) -> SampleBuffer {
        let samples = (0..16000)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / 16000.0).sin() as f32)
            .collect();
        SampleBuffer::new(samples, 16000).unwrap()
    }

    #[test]
    fn test_rules() {
        let h = HeuristicClassifier::new();
        let stats = |rms, pitch_hz, zcr| ChunkStats { rms, pitch_hz, zcr };
        assert_eq!(h.label_for(&stats(0.1, 250.0, 0.2)), "angry");
        assert_eq!(h.label_for(&stats(0.1, 250.0, 0.05)), "happy");
        assert_eq!(h.label_for(&stats(0.005, 100.0, 0.05)), "sad");
        assert_eq!(h.label_for(&stats(0.02, 140.0, 0.05)), "neutral");
    }

    #[test]
    fn test_empty_chunk_is_unknown() {
        let obs = HeuristicClassifier::new().classify(&SampleBuffer::new(vec![], 16000).unwrap());
        assert_eq!(obs.label(), "unknown");
        assert_eq!(obs.confidence(), 0.0);
    }

    #[test]
    fn test_loud_high_tone_is_happy() {
        let obs = HeuristicClassifier::new().classify(&tone(220.0, 0.5));
        assert_eq!(obs.label(), "happy");
        assert_eq!(obs.confidence(), 1.0);
        assert_eq!(obs.distribution().len(), 4);
        assert_eq!(obs.distribution()["happy"], 1.0);
    }

    #[test]
    fn test_silence_is_sad() {
        let buf = SampleBuffer::new(vec![0.0; 16000], 16000).unwrap();
        assert_eq!(HeuristicClassifier::new().classify(&buf).label(), "sad");
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }
}
