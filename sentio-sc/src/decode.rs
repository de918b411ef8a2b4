//! In-memory decoding of uploaded audio files

use crate::buffer::SampleBuffer;
use crate::error::AudioError;
use crate::resample::resample_to;
use bytes::Bytes;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer as PcmBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode an uploaded file to mono samples at `target_rate`.
///
/// The general-purpose decoder runs first; the plain WAV reader is only
/// tried when it fails. When both fail the first decoder's error is reported.
pub fn decode_upload(
    data: Bytes,
    extension: Option<&str>,
    target_rate: u32,
) -> Result<SampleBuffer, AudioError> {
    let decoded = match decode_primary(data.clone(), extension) {
        Ok(buffer) => buffer,
        Err(primary) => {
            warn!(error = %primary, "primary decode failed, falling back to WAV reader");
            decode_wav(&data).map_err(|secondary| {
                debug!(error = %secondary, "WAV fallback failed");
                primary
            })?
        }
    };
    resample_to(decoded, target_rate)
}

/// Probe and decode any supported container, down-mixed to mono
pub fn decode_primary(data: Bytes, extension: Option<&str>) -> Result<SampleBuffer, AudioError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::Decode(format!("Failed to probe audio: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(format!("Unsupported codec: {}", e)))?;

    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::Decode(format!("Error reading packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = %e, "skipping corrupt packet");
                continue;
            }
            Err(e) => return Err(AudioError::Decode(format!("Decode failed: {}", e))),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        let channels = spec.channels.count().max(1);
        let mut pcm = PcmBuffer::<f32>::new(decoded.capacity() as u64, spec);
        pcm.copy_interleaved_ref(decoded);
        mono.extend(crate::buffer::downmix(pcm.samples(), channels));
    }

    let rate = sample_rate.ok_or_else(|| AudioError::Decode("Sample rate unknown".to_string()))?;
    debug!(samples = mono.len(), sample_rate = rate, "decoded upload");
    SampleBuffer::new(mono, rate)
}

/// RIFF/WAV reader; integer PCM is scaled to [-1, 1) by its bit depth
pub fn decode_wav(data: &[u8]) -> Result<SampleBuffer, AudioError> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| AudioError::Decode(format!("Invalid WAV data: {}", e)))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::Decode(format!("Invalid WAV samples: {}", e)))?,
        hound::SampleFormat::Int => {
            let full_scale = (1u64 << spec.bits_per_sample.saturating_sub(1).min(31)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::Decode(format!("Invalid WAV samples: {}", e)))?
        }
    };

    SampleBuffer::from_interleaved(&interleaved, usize::from(spec.channels), spec.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_i16(samples: &[i16], channels: u16, rate: u32) -> Bytes {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        Bytes::from(cursor.into_inner())
    }

    #[test]
    fn test_primary_decodes_wav() {
        let data = wav_i16(&[0, 16384, -16384, 32767], 1, 22050);
        let buf = decode_primary(data, Some("wav")).unwrap();
        assert_eq!(buf.sample_rate(), 22050);
        assert_eq!(buf.len(), 4);
        assert!((buf.samples()[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_wav_reader_scales_int16() {
        let data = wav_i16(&[16384, -32768], 1, 8000);
        let buf = decode_wav(&data).unwrap();
        assert_eq!(buf.samples(), &[0.5, -1.0]);
    }

    #[test]
    fn test_decoders_agree_on_stereo() {
        let data = wav_i16(&[16384, 0, -16384, -16384], 2, 22050);
        let a = decode_primary(data.clone(), None).unwrap();
        let b = decode_wav(&data).unwrap();
        assert_eq!(a.len(), 2);
        for (x, y) in a.samples().iter().zip(b.samples()) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_garbage_fails_both_decoders() {
        let result = decode_upload(Bytes::from_static(b"definitely not audio"), Some("mp3"), 22050);
        assert!(matches!(result, Err(AudioError::Decode(_))));
    }

    #[test]
    fn test_upload_is_resampled() {
        let samples: Vec<i16> = (0..8000).map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16).collect();
        let buf = decode_upload(wav_i16(&samples, 1, 8000), Some("wav"), 22050).unwrap();
        assert_eq!(buf.sample_rate(), 22050);
        assert!(buf.len() > 20000);
    }
}
