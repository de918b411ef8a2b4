//! Fixed-duration capture from an audio input

use crate::buffer::SampleBuffer;
use crate::error::AudioError;
use crate::resample::resample_to;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat, StreamConfig};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Blocking source of fixed-length mono chunks
pub trait AudioSource: Send + Sync {
    /// Capture `duration` of audio, delivered at `sample_rate`
    fn capture(&self, duration: Duration, sample_rate: u32) -> Result<SampleBuffer, AudioError>;

    fn name(&self) -> String;
}

/// System microphone via cpal.
///
/// The device is looked up per capture so a replugged microphone is picked
/// up on the next chunk; the stream lives only for the length of one capture.
#[derive(Debug, Clone, Default)]
pub struct MicrophoneSource {
    device_name: Option<String>,
}

impl MicrophoneSource {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// Names of available input devices
    pub fn list_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Device(format!("Failed to enumerate devices: {}", e)))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn open_device(&self, host: &Host) -> Result<Device, AudioError> {
        match self.device_name {
            Some(ref wanted) => {
                const MAX_DEVICES_TO_CHECK: usize = 100;
                let mut devices = host
                    .input_devices()
                    .map_err(|e| AudioError::Device(format!("Failed to enumerate devices: {}", e)))?;
                devices
                    .by_ref()
                    .take(MAX_DEVICES_TO_CHECK)
                    .find(|d| d.name().map(|n| n == *wanted || n.contains(wanted.as_str())).unwrap_or(false))
                    .ok_or_else(|| AudioError::Device(format!("Input device '{}' not found", wanted)))
            }
            None => host
                .default_input_device()
                .ok_or_else(|| AudioError::Device("No input device available".to_string())),
        }
    }
}

/// Extra wait beyond the requested duration before a capture is declared short
const CAPTURE_GRACE: Duration = Duration::from_secs(2);

/// Accumulates interleaved input until exactly `target` samples are held,
/// then signals `done` once. Anything past the target is dropped.
struct ChunkCollector {
    samples: Vec<f32>,
    target: usize,
    done: Option<Sender<()>>,
}

impl ChunkCollector {
    fn new(target: usize, done: Sender<()>) -> Self {
        Self {
            samples: Vec::with_capacity(target),
            target,
            done: Some(done),
        }
    }

    fn push<I: IntoIterator<Item = f32>>(&mut self, data: I) {
        let room = self.target.saturating_sub(self.samples.len());
        if room == 0 {
            return;
        }
        self.samples.extend(data.into_iter().take(room));
        if self.is_complete() {
            if let Some(tx) = self.done.take() {
                let _ = tx.try_send(());
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.samples.len() >= self.target
    }

    fn take(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }
}

/// Frames covering `duration` at `rate`, at least one
fn frames_for(duration: Duration, rate: u32) -> usize {
    ((duration.as_secs_f64() * f64::from(rate)) as usize).max(1)
}

/// Pin a resampled buffer to exactly `frames` samples. Resampling rounds,
/// so at most a sample or two is trimmed or zero-padded here.
fn exact_length(buffer: SampleBuffer, frames: usize) -> Result<SampleBuffer, AudioError> {
    let rate = buffer.sample_rate();
    let mut samples = buffer.into_samples();
    samples.resize(frames, 0.0);
    SampleBuffer::new(samples, rate)
}

impl AudioSource for MicrophoneSource {
    /// Records until exactly `duration * device_rate` frames have arrived,
    /// then delivers `duration * sample_rate` samples. A device that falls
    /// short of that within the grace period is a capture error.
    fn capture(&self, duration: Duration, sample_rate: u32) -> Result<SampleBuffer, AudioError> {
        let host = cpal::default_host();
        let device = self.open_device(&host)?;
        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::Device(format!("Failed to get input config: {}", e)))?;
        let format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let device_rate = config.sample_rate.0;
        let channels = usize::from(config.channels.max(1));

        let target = frames_for(duration, device_rate) * channels;
        debug!(
            device_rate,
            channels,
            format = ?format,
            target_samples = target,
            "starting capture"
        );

        let (done_tx, done_rx) = channel::bounded(1);
        let shared = Arc::new(Mutex::new(ChunkCollector::new(target, done_tx)));
        let err_fn = |err: cpal::StreamError| error!("Audio stream error: {}", err);

        let stream = match format {
            SampleFormat::F32 => {
                let sink = shared.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        sink.lock().push(data.iter().copied());
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let sink = shared.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        sink.lock().push(data.iter().map(|&s| f32::from(s) / 32_768.0));
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let sink = shared.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        sink.lock()
                            .push(data.iter().map(|&s| (f32::from(s) - 32_768.0) / 32_768.0));
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(AudioError::Format(format!("Unsupported sample format: {:?}", other)));
            }
        }
        .map_err(|e| AudioError::Capture(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::Capture(format!("Failed to start stream: {}", e)))?;
        let waited = done_rx.recv_timeout(duration + CAPTURE_GRACE);
        if let Err(e) = stream.pause() {
            debug!("failed to pause audio stream: {}", e);
        }
        drop(stream);

        let mut collector = shared.lock();
        if waited.is_err() || !collector.is_complete() {
            return Err(AudioError::Capture(format!(
                "Captured {} of {} samples from '{}'",
                collector.samples.len(),
                target,
                self.name()
            )));
        }
        let interleaved = collector.take();
        drop(collector);

        let buffer = SampleBuffer::from_interleaved(&interleaved, channels, device_rate)?;
        info!(samples = buffer.len(), device_rate, "captured audio chunk");
        exact_length(resample_to(buffer, sample_rate)?, frames_for(duration, sample_rate))
    }

    fn name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default input".to_string())
    }
}
