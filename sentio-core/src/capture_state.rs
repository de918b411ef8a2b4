//! Cooperative start/stop state for the video capture loop

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Where the frame loop is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    /// No loop is executing
    Idle,
    /// A loop is executing frames while `active` holds
    Running,
    /// `active` was cleared; the loop finishes its in-flight frame and exits
    Stopping,
}

/// The `active` flag plus the phase of the loop that polls it.
///
/// `stop()` clears `active` immediately; the loop notices on its next
/// iteration, so loop exit lags by at most one frame.
#[derive(Debug)]
pub struct CaptureState {
    active: AtomicBool,
    phase: Mutex<LoopPhase>,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self {
            active: AtomicBool::new(false),
            phase: Mutex::new(LoopPhase::Idle),
        }
    }
}

impl CaptureState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `active`. A loop that was winding down resumes running.
    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
        let mut phase = self.phase.lock();
        if *phase == LoopPhase::Stopping {
            *phase = LoopPhase::Running;
        }
        debug!("capture activated (phase {:?})", *phase);
    }

    /// Clear `active`. Returns without waiting for the loop.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut phase = self.phase.lock();
        if *phase == LoopPhase::Running {
            *phase = LoopPhase::Stopping;
        }
        debug!("capture deactivated (phase {:?})", *phase);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> LoopPhase {
        *self.phase.lock()
    }

    /// Claim the loop slot. Only one loop runs at a time; `None` means
    /// another loop already holds it. The guard returns the phase to
    /// `Idle` when dropped.
    pub fn enter(self: &Arc<Self>) -> Option<LoopGuard> {
        let mut phase = self.phase.lock();
        if *phase != LoopPhase::Idle {
            return None;
        }
        *phase = if self.is_active() {
            LoopPhase::Running
        } else {
            LoopPhase::Stopping
        };
        Some(LoopGuard {
            state: Arc::clone(self),
        })
    }
}

/// Held by the running loop
#[derive(Debug)]
pub struct LoopGuard {
    state: Arc<CaptureState>,
}

impl LoopGuard {
    /// Polled once per iteration
    pub fn should_continue(&self) -> bool {
        self.state.is_active()
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        *self.state.phase.lock() = LoopPhase::Idle;
        debug!("capture loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = CaptureState::new();
        assert!(!state.is_active());
        assert_eq!(state.phase(), LoopPhase::Idle);
    }

    #[test]
    fn test_start_stop_flag() {
        let state = CaptureState::new();
        state.start();
        assert!(state.is_active());
        state.stop();
        assert!(!state.is_active());
        assert_eq!(state.phase(), LoopPhase::Idle);
    }

    #[test]
    fn test_loop_phase_transitions() {
        let state = Arc::new(CaptureState::new());
        state.start();

        let guard = state.enter().expect("slot should be free");
        assert_eq!(state.phase(), LoopPhase::Running);
        assert!(guard.should_continue());

        state.stop();
        assert_eq!(state.phase(), LoopPhase::Stopping);
        assert!(!guard.should_continue());

        drop(guard);
        assert_eq!(state.phase(), LoopPhase::Idle);
    }

    #[test]
    fn test_single_loop_slot() {
        let state = Arc::new(CaptureState::new());
        state.start();
        let _guard = state.enter().unwrap();
        assert!(state.enter().is_none());
    }

    #[test]
    fn test_restart_while_stopping() {
        let state = Arc::new(CaptureState::new());
        state.start();
        let guard = state.enter().unwrap();
        state.stop();
        state.start();
        assert_eq!(state.phase(), LoopPhase::Running);
        assert!(guard.should_continue());
    }
}
