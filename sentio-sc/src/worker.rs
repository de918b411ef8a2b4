//! Background voice worker: capture a chunk, classify, publish, repeat

use crate::capture::AudioSource;
use crate::classifier::EmotionClassifier;
use crate::config::WorkerConfig;
use crate::error::AudioError;
use crate::features::FeatureExtractor;
use crate::heuristic::HeuristicClassifier;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use sentio_core::{EmotionObservation, LatestCell, Source};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Exponential retry delay: initial, doubled per consecutive failure, capped
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay for the next retry
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// How each chunk is classified
#[derive(Debug, Clone)]
pub enum VoiceBackend {
    Trained(Arc<EmotionClassifier>),
    Heuristic(HeuristicClassifier),
}

impl VoiceBackend {
    pub fn from_classifier(classifier: Option<Arc<EmotionClassifier>>) -> Self {
        match classifier {
            Some(c) => VoiceBackend::Trained(c),
            None => VoiceBackend::Heuristic(HeuristicClassifier::default()),
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, VoiceBackend::Trained(_))
    }
}

struct WorkerLoop {
    config: WorkerConfig,
    source: Arc<dyn AudioSource>,
    backend: VoiceBackend,
    extractor: FeatureExtractor,
    cell: Arc<LatestCell<EmotionObservation>>,
    stop_rx: Receiver<()>,
}

impl WorkerLoop {
    fn run(self) {
        let chunk = Duration::from_secs_f32(self.config.chunk_secs);
        let mut backoff = Backoff::new(
            Duration::from_millis(self.config.backoff_initial_ms),
            Duration::from_millis(self.config.backoff_max_ms),
        );
        let mut failures = 0u32;

        info!(
            source = %self.source.name(),
            sample_rate = self.config.sample_rate,
            chunk_secs = self.config.chunk_secs,
            trained = self.backend.is_trained(),
            "voice worker started"
        );

        while !self.stop_requested() {
            match self.iteration(chunk) {
                Ok(observation) => {
                    if failures > 0 {
                        info!(failures, "voice worker recovered");
                    }
                    failures = 0;
                    backoff.reset();
                    debug!(
                        label = observation.label(),
                        confidence = observation.confidence(),
                        "voice observation"
                    );
                    self.cell.publish(observation);
                }
                Err(e) => {
                    // Never leave a stale emotion readable as current
                    self.cell
                        .publish(EmotionObservation::unknown(Source::Voice, e.to_string()));
                    failures = failures.saturating_add(1);
                    let delay = backoff.next_delay();
                    if failures >= self.config.failure_warn_threshold {
                        error!(failures, error = %e, retry_ms = delay.as_millis() as u64, "voice worker keeps failing");
                    } else {
                        warn!(failures, error = %e, retry_ms = delay.as_millis() as u64, "voice worker iteration failed");
                    }
                    if self.wait_or_stop(delay) {
                        break;
                    }
                }
            }
        }

        info!("voice worker stopped");
    }

    /// Capture, then extract, then classify
    fn iteration(&self, chunk: Duration) -> Result<EmotionObservation, AudioError> {
        let buffer = self.source.capture(chunk, self.config.sample_rate)?;
        match self.backend {
            VoiceBackend::Trained(ref classifier) => {
                let features = self.extractor.extract(&buffer)?;
                Ok(classifier.predict(&features))
            }
            VoiceBackend::Heuristic(ref heuristic) => Ok(heuristic.classify(&buffer)),
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop_rx.try_recv(), Err(channel::TryRecvError::Empty))
    }

    /// Sleep for `delay`, returning early (true) when stop is signalled
    fn wait_or_stop(&self, delay: Duration) -> bool {
        !matches!(self.stop_rx.recv_timeout(delay), Err(RecvTimeoutError::Timeout))
    }
}

/// Handle to the running worker thread. Dropping it stops and joins the worker.
pub struct VoiceWorker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for VoiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceWorker")
            .field("running", &self.is_running())
            .finish()
    }
}

impl VoiceWorker {
    pub fn spawn(
        config: WorkerConfig,
        source: Arc<dyn AudioSource>,
        backend: VoiceBackend,
        cell: Arc<LatestCell<EmotionObservation>>,
    ) -> Result<Self, AudioError> {
        config.validate().map_err(AudioError::Config)?;

        let (stop_tx, stop_rx) = channel::bounded(1);
        let worker = WorkerLoop {
            config,
            source,
            backend,
            extractor: FeatureExtractor::new(),
            cell,
            stop_rx,
        };

        let handle = std::thread::Builder::new()
            .name("sentio-voice".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Ask the worker to stop after the in-flight chunk
    pub fn stop(&self) {
        if let Some(ref tx) = self.stop_tx {
            let _ = tx.try_send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Stop and wait for the thread to exit
    pub fn shutdown(&mut self) {
        self.stop();
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("voice worker thread panicked");
            }
        }
    }
}

impl Drop for VoiceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleBuffer;
    use crate::classifier::{ClassifierModel, DecisionModel, StandardScaler};
    use crate::features::FEATURE_LEN;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted results, then repeats the last one
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<f32>, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<f32>, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl AudioSource for ScriptedSource {
        fn capture(&self, _duration: Duration, sample_rate: u32) -> Result<SampleBuffer, AudioError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            let mut script = self.script.lock();
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            match next {
                Some(Ok(samples)) => SampleBuffer::new(samples, sample_rate),
                Some(Err(msg)) => Err(AudioError::Capture(msg)),
                None => Err(AudioError::Capture("script empty".to_string())),
            }
        }

        fn name(&self) -> String {
            "scripted".to_string()
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            backoff_initial_ms: 1,
            backoff_max_ms: 4,
            ..WorkerConfig::default()
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        for _ in 0..500 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_millis(5000));
        let delays: Vec<u64> = (0..8).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 3200, 5000, 5000]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_worker_survives_failures_and_publishes() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err("device busy".to_string()),
            Err("device busy".to_string()),
            Ok(vec![0.0; 1600]),
        ]));
        let cell = Arc::new(LatestCell::new());
        let mut worker = VoiceWorker::spawn(
            fast_config(),
            source.clone(),
            VoiceBackend::from_classifier(None),
            cell.clone(),
        )
        .unwrap();

        // Silence under the heuristic rules
        assert!(wait_for(|| cell.latest().map(|o| o.label() == "sad").unwrap_or(false)));
        assert!(source.calls.load(Ordering::SeqCst) >= 3);

        worker.shutdown();
        assert!(!worker.is_running());
    }

    #[derive(Debug)]
    struct AlwaysCalm;

    impl DecisionModel for AlwaysCalm {
        fn n_classes(&self) -> usize {
            2
        }

        fn posterior(&self, _scaled: &[f32; FEATURE_LEN]) -> Result<Vec<f32>, AudioError> {
            Ok(vec![0.9, 0.1])
        }
    }

    fn trained() -> VoiceBackend {
        let scaler = StandardScaler {
            mean: vec![0.0; FEATURE_LEN],
            scale: vec![1.0; FEATURE_LEN],
        };
        let model = ClassifierModel::new(
            scaler,
            Box::new(AlwaysCalm),
            vec!["calm".to_string(), "angry".to_string()],
        )
        .unwrap();
        VoiceBackend::from_classifier(Some(Arc::new(EmotionClassifier::new(model))))
    }

    #[test]
    fn test_failed_chunk_replaces_previous_result() {
        let tone: Vec<f32> = (0..16000)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin())
            .collect();
        let source = Arc::new(ScriptedSource::new(vec![Ok(tone), Ok(vec![0.0; 16000])]));
        let cell = Arc::new(LatestCell::new());
        let mut worker = VoiceWorker::spawn(fast_config(), source.clone(), trained(), cell.clone()).unwrap();

        // Silence cannot be featurised, so the calm result must not linger
        assert!(wait_for(|| cell.version() >= 2));
        let latest = cell.latest().unwrap();
        assert_eq!(latest.label(), sentio_core::UNKNOWN_LABEL);
        assert_eq!(latest.confidence(), 0.0);
        assert!(latest.error().is_some());

        worker.shutdown();
    }

    #[test]
    fn test_capture_failure_publishes_unknown() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![0.0; 1600]), Err("unplugged".to_string())]));
        let cell = Arc::new(LatestCell::new());
        let mut worker =
            VoiceWorker::spawn(fast_config(), source.clone(), VoiceBackend::from_classifier(None), cell.clone())
                .unwrap();

        assert!(wait_for(|| cell.latest().map(|o| o.error().is_some()).unwrap_or(false)));
        assert!(cell.latest().unwrap().error().unwrap().contains("unplugged"));

        worker.shutdown();
    }

    #[test]
    fn test_stop_interrupts_backoff() {
        let source = Arc::new(ScriptedSource::new(vec![Err("unplugged".to_string())]));
        let config = WorkerConfig {
            backoff_initial_ms: 60_000,
            backoff_max_ms: 60_000,
            ..WorkerConfig::default()
        };
        let cell = Arc::new(LatestCell::new());
        let mut worker =
            VoiceWorker::spawn(config, source.clone(), VoiceBackend::from_classifier(None), cell.clone())
                .unwrap();

        assert!(wait_for(|| source.calls.load(Ordering::SeqCst) >= 1));
        let started = std::time::Instant::now();
        worker.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(cell.latest().unwrap().label(), sentio_core::UNKNOWN_LABEL);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = WorkerConfig {
            sample_rate: 0,
            ..WorkerConfig::default()
        };
        let result = VoiceWorker::spawn(
            config,
            Arc::new(ScriptedSource::new(vec![])),
            VoiceBackend::from_classifier(None),
            Arc::new(LatestCell::new()),
        );
        assert!(matches!(result, Err(AudioError::Config(_))));
    }
}
