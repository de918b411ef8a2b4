//! Sample-rate conversion with rubato

use crate::buffer::SampleBuffer;
use crate::error::AudioError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Input frames handed to rubato per call
const CHUNK_FRAMES: usize = 1024;

/// Bring `buffer` to `target_rate`. Already at the target rate returns it unchanged.
///
/// The resampler's output delay is trimmed and its tail flushed, so the result
/// holds `round(len * target / source)` samples aligned with the input.
pub fn resample_to(buffer: SampleBuffer, target_rate: u32) -> Result<SampleBuffer, AudioError> {
    if target_rate == 0 {
        return Err(AudioError::Format("Target sample rate must be greater than 0".to_string()));
    }
    let source_rate = buffer.sample_rate();
    if source_rate == target_rate || buffer.is_empty() {
        return SampleBuffer::new(buffer.into_samples(), target_rate);
    }

    let input = buffer.into_samples();
    let input_frames = input.len();
    let ratio = f64::from(target_rate) / f64::from(source_rate);
    let expected = (input_frames as f64 * ratio).round() as usize;

    let mut resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, CHUNK_FRAMES, 1)
        .map_err(|e| AudioError::Format(format!("Failed to create resampler: {}", e)))?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + CHUNK_FRAMES);
    let mut pos = 0;
    while input_frames - pos >= resampler.input_frames_next() {
        let next = resampler.input_frames_next();
        let block = resampler
            .process(&[&input[pos..pos + next]][..], None)
            .map_err(|e| AudioError::Format(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&block[0]);
        pos += next;
    }
    if pos < input_frames {
        let block = resampler
            .process_partial(Some(&[&input[pos..]][..]), None)
            .map_err(|e| AudioError::Format(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&block[0]);
    }

    // Flush with silence until the delayed tail is out
    while output.len() < expected + delay {
        let block = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::Format(format!("Resampling failed: {}", e)))?;
        if block[0].is_empty() {
            break;
        }
        output.extend_from_slice(&block[0]);
    }

    let samples: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    debug!(
        source_rate,
        target_rate,
        input_frames,
        delay,
        output_frames = samples.len(),
        "resampled audio"
    );
    SampleBuffer::new(samples, target_rate)
}
