//! Short-time spectral primitives behind the feature extractor
//!
//! Framing follows the usual centred convention: frame `i` is centred on
//! sample `i * hop`, and `1 + len / hop` frames cover a signal of `len`
//! samples. All arithmetic runs in f64 and in a fixed order, so identical
//! input always produces identical output.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::ops::Range;
use std::sync::Arc;

/// FFT size and analysis frame length
pub const N_FFT: usize = 2048;

/// Hop between successive frames
pub const HOP_LENGTH: usize = 512;

/// Mel bands feeding the cepstral transform
pub const N_MELS: usize = 128;

/// Pitch classes
pub const N_CHROMA: usize = 12;

const AMIN: f64 = 1e-10;
const TOP_DB: f64 = 80.0;
const ZERO_THRESHOLD: f32 = 1e-10;

/// Number of centred frames over `len` samples
pub fn frame_count(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Mean power per centred frame, zero-padded beyond the signal edges
pub fn frame_power(samples: &[f32], frame: usize, hop: usize) -> Vec<f64> {
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    let mut acc = 0.0f64;
    prefix.push(acc);
    for &s in samples {
        acc += f64::from(s) * f64::from(s);
        prefix.push(acc);
    }

    let half = frame / 2;
    (0..frame_count(samples.len(), hop))
        .map(|i| {
            let center = i * hop;
            let lo = center.saturating_sub(half).min(samples.len());
            let hi = (center + frame - half).min(samples.len());
            if hi <= lo {
                0.0
            } else {
                ((prefix[hi] - prefix[lo]) / frame as f64).max(0.0)
            }
        })
        .collect()
}

/// RMS per centred frame
pub fn frame_rms(samples: &[f32], frame: usize, hop: usize) -> Vec<f64> {
    frame_power(samples, frame, hop).into_iter().map(f64::sqrt).collect()
}

/// Sample range holding everything louder than `top_db` below the loudest
/// frame. Empty when the signal carries no energy at all.
pub fn nonsilent_range(samples: &[f32], top_db: f64, frame: usize, hop: usize) -> Range<usize> {
    if samples.is_empty() {
        return 0..0;
    }

    let power = frame_power(samples, frame, hop);
    let peak = power.iter().copied().fold(0.0f64, f64::max);
    if peak <= 0.0 {
        return 0..0;
    }

    let ref_db = 10.0 * peak.max(AMIN).log10();
    let loud: Vec<usize> = power
        .iter()
        .enumerate()
        .filter(|(_, &p)| 10.0 * p.max(AMIN).log10() - ref_db > -top_db)
        .map(|(i, _)| i)
        .collect();

    match (loud.first(), loud.last()) {
        (Some(&first), Some(&last)) => {
            let start = (first * hop).min(samples.len());
            let end = ((last + 1) * hop).min(samples.len());
            start..end.max(start)
        }
        _ => 0..0,
    }
}

/// Scale so the largest magnitude is 1. A silent buffer is left untouched.
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 && peak.is_finite() {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// Mean zero-crossing rate over centred, edge-padded frames
pub fn zero_crossing_rate(samples: &[f32], frame: usize, hop: usize) -> f64 {
    if samples.is_empty() || frame < 2 {
        return 0.0;
    }

    let last = samples.len() - 1;
    let half = frame / 2;
    let negative = |offset: isize| -> bool {
        let idx = offset.clamp(0, last as isize) as usize;
        samples[idx] < -ZERO_THRESHOLD
    };

    let n_frames = frame_count(samples.len(), hop);
    let mut total = 0.0f64;
    for i in 0..n_frames {
        let start = (i * hop) as isize - half as isize;
        let mut crossings = 0usize;
        let mut prev = negative(start);
        for n in 1..frame {
            let cur = negative(start + n as isize);
            if cur != prev {
                crossings += 1;
            }
            prev = cur;
        }
        total += crossings as f64 / frame as f64;
    }
    total / n_frames as f64
}

/// Windowed short-time power spectrum
pub struct Stft {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft").field("n_fft", &N_FFT).finish()
    }
}

impl Default for Stft {
    fn default() -> Self {
        Self::new()
    }
}

impl Stft {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(N_FFT);
        // Periodic Hann
        let window = (0..N_FFT)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / N_FFT as f64).cos())
            .collect();
        Self { fft, window }
    }

    /// `|X|^2` for bins `0..=N_FFT/2`, one row per centred frame
    pub fn power(&self, samples: &[f32]) -> Vec<Vec<f64>> {
        let half = N_FFT / 2;
        let n_frames = frame_count(samples.len(), HOP_LENGTH);
        let mut buffer = vec![Complex::new(0.0f64, 0.0); N_FFT];
        let mut scratch = vec![Complex::new(0.0f64, 0.0); self.fft.get_inplace_scratch_len()];
        let mut frames = Vec::with_capacity(n_frames);

        for i in 0..n_frames {
            let start = (i * HOP_LENGTH) as isize - half as isize;
            for (n, slot) in buffer.iter_mut().enumerate() {
                let idx = start + n as isize;
                let sample = if idx >= 0 && (idx as usize) < samples.len() {
                    f64::from(samples[idx as usize])
                } else {
                    0.0
                };
                *slot = Complex::new(sample * self.window[n], 0.0);
            }
            self.fft.process_with_scratch(&mut buffer, &mut scratch);
            frames.push(buffer[..=half].iter().map(|c| c.norm_sqr()).collect());
        }

        frames
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    // Slaney scale: linear below 1 kHz, logarithmic above
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Area-normalised triangular mel filters, `N_MELS` rows of `N_FFT/2 + 1`
pub fn mel_filterbank(sample_rate: u32) -> Vec<Vec<f64>> {
    let sr = f64::from(sample_rate);
    let n_bins = N_FFT / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * sr / N_FFT as f64).collect();

    let mel_max = hz_to_mel(sr / 2.0);
    let mel_points: Vec<f64> = (0..N_MELS + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (N_MELS + 1) as f64))
        .collect();

    (0..N_MELS)
        .map(|m| {
            let lower_width = mel_points[m + 1] - mel_points[m];
            let upper_width = mel_points[m + 2] - mel_points[m + 1];
            let enorm = 2.0 / (mel_points[m + 2] - mel_points[m]);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - mel_points[m]) / lower_width;
                    let upper = (mel_points[m + 2] - f) / upper_width;
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// Gaussian pitch-class filters, `N_CHROMA` rows of `N_FFT/2 + 1`, row 0 = C
pub fn chroma_filterbank(sample_rate: u32) -> Vec<Vec<f64>> {
    let sr = f64::from(sample_rate);
    let n_chroma = N_CHROMA as f64;
    let n_bins = N_FFT / 2 + 1;

    // Fractional pitch-class position of every FFT bin, relative to A0 / 16
    let mut frq_bins: Vec<f64> = Vec::with_capacity(n_bins + 1);
    for k in 1..=n_bins {
        let hz = k as f64 * sr / N_FFT as f64;
        frq_bins.push(n_chroma * (hz / (440.0 / 16.0)).log2());
    }
    let dc = frq_bins[0] - 1.5 * n_chroma;
    frq_bins.insert(0, dc);

    let bin_widths: Vec<f64> = (0..n_bins)
        .map(|k| (frq_bins[k + 1] - frq_bins[k]).max(1.0))
        .collect();

    let half_chroma = (n_chroma / 2.0).round();
    let mut weights = vec![vec![0.0f64; n_bins]; N_CHROMA];
    for k in 0..n_bins {
        for (c, row) in weights.iter_mut().enumerate() {
            let d = (frq_bins[k] - c as f64 + half_chroma + 10.0 * n_chroma).rem_euclid(n_chroma)
                - half_chroma;
            row[k] = (-0.5 * (2.0 * d / bin_widths[k]).powi(2)).exp();
        }

        let norm = weights.iter().map(|row| row[k] * row[k]).sum::<f64>().sqrt();
        // Octave weighting centred on octave 5, two octaves wide
        let octave = (-0.5 * ((frq_bins[k] / n_chroma - 5.0) / 2.0).powi(2)).exp();
        for row in weights.iter_mut() {
            if norm > 0.0 {
                row[k] /= norm;
            }
            row[k] *= octave;
        }
    }

    // Rows above are A-based; rotate so row 0 is C
    weights.rotate_left(3);
    weights
}

/// First `n_coeffs` orthonormal DCT-II coefficients of `input`
pub fn dct_ortho(input: &[f64], n_coeffs: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_coeffs)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

fn apply_filterbank(bank: &[Vec<f64>], spectrum: &[f64]) -> Vec<f64> {
    bank.iter()
        .map(|row| row.iter().zip(spectrum).map(|(w, s)| w * s).sum())
        .collect()
}

/// Per-coefficient mean of the cepstral coefficients over all frames
pub fn mfcc_means(power: &[Vec<f64>], sample_rate: u32, n_mfcc: usize) -> Vec<f64> {
    if power.is_empty() {
        return vec![0.0; n_mfcc];
    }
    let bank = mel_filterbank(sample_rate);

    let mut mel_db: Vec<Vec<f64>> = power
        .iter()
        .map(|frame| {
            apply_filterbank(&bank, frame)
                .into_iter()
                .map(|e| 10.0 * e.max(AMIN).log10())
                .collect()
        })
        .collect();

    // Dynamic range is clipped against the loudest cell of the whole matrix
    let max_db = mel_db
        .iter()
        .flat_map(|row| row.iter().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = max_db - TOP_DB;
    for row in mel_db.iter_mut() {
        for v in row.iter_mut() {
            *v = v.max(floor);
        }
    }

    let mut sums = vec![0.0f64; n_mfcc];
    for row in &mel_db {
        for (acc, c) in sums.iter_mut().zip(dct_ortho(row, n_mfcc)) {
            *acc += c;
        }
    }
    sums.into_iter().map(|s| s / power.len() as f64).collect()
}

/// Per-pitch-class mean of the peak-normalised chroma over all frames
pub fn chroma_means(power: &[Vec<f64>], sample_rate: u32) -> Vec<f64> {
    if power.is_empty() {
        return vec![0.0; N_CHROMA];
    }
    let bank = chroma_filterbank(sample_rate);

    let mut sums = vec![0.0f64; N_CHROMA];
    for frame in power {
        let raw = apply_filterbank(&bank, frame);
        let peak = raw.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let scale = if peak > f64::MIN_POSITIVE { peak } else { 1.0 };
        for (acc, v) in sums.iter_mut().zip(raw) {
            *acc += v / scale;
        }
    }
    sums.into_iter().map(|s| s / power.len() as f64).collect()
}

/// Autocorrelation pitch estimate for one frame, `None` when unvoiced
pub fn autocorrelation_pitch(frame: &[f32], sample_rate: u32, fmin: f64, fmax: f64) -> Option<f64> {
    let sr = f64::from(sample_rate);
    let min_lag = (sr / fmax).floor().max(1.0) as usize;
    let max_lag = (sr / fmin).ceil() as usize;
    if frame.len() <= max_lag {
        return None;
    }

    let energy: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    if energy <= AMIN {
        return None;
    }

    let mut best_lag = 0usize;
    let mut best = 0.0f64;
    for lag in min_lag..=max_lag {
        let r: f64 = frame[..frame.len() - lag]
            .iter()
            .zip(&frame[lag..])
            .map(|(&a, &b)| f64::from(a) * f64::from(b))
            .sum();
        let r = r / energy;
        if r > best {
            best = r;
            best_lag = lag;
        }
    }

    const VOICING_THRESHOLD: f64 = 0.3;
    if best_lag == 0 || best < VOICING_THRESHOLD {
        None
    } else {
        Some(sr / best_lag as f64)
    }
}
