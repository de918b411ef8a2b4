//! Single-value latest-wins slot

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Holds at most one value; every publish replaces the previous one.
/// No queueing and no backlog: a slow reader simply sees the newest value.
#[derive(Debug)]
pub struct LatestCell<T> {
    slot: RwLock<Option<T>>,
    version: AtomicU64,
}

impl<T> Default for LatestCell<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }
}

impl<T: Clone> LatestCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held value
    pub fn publish(&self, value: T) {
        *self.slot.write() = Some(value);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Copy of the newest value, if any has been published
    pub fn latest(&self) -> Option<T> {
        self.slot.read().clone()
    }

    /// Number of publishes so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
