//! Latest face observations, keyed by detection index within a frame

use crate::observation::EmotionObservation;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Lock-protected detection-slot map.
///
/// The video loop calls `reset()` once at the start of every frame and
/// then `put()` once per classified region; readers take `snapshot()`.
/// All three serialise on the same lock, so a snapshot is always a
/// consistent copy of whole observations. A snapshot taken mid-frame can
/// contain fewer entries than the finished frame will, never entries from
/// two different frames.
#[derive(Debug, Default)]
pub struct SharedEmotionRegistry {
    entries: Mutex<BTreeMap<usize, EmotionObservation>>,
}

impl SharedEmotionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every slot
    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    /// Insert or overwrite one slot
    pub fn put(&self, index: usize, observation: EmotionObservation) {
        self.entries.lock().insert(index, observation);
    }

    /// Point-in-time copy of every slot
    pub fn snapshot(&self) -> BTreeMap<usize, EmotionObservation> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
