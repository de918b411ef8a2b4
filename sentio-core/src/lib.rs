//! sentio-core: shared building blocks for the sentio emotion pipeline
//!
//! Holds the observation model produced by the face and voice classifiers,
//! the confidence gate applied after every classifier call, and the shared
//! state the capture loops publish into:
//! - `SharedEmotionRegistry` for per-frame face observations
//! - `LatestCell` for the single latest voice observation
//! - `CaptureState` for cooperative start/stop of the video loop

pub mod error;
pub mod observation;
pub mod gate;
pub mod registry;
pub mod latest;
pub mod capture_state;

pub use error::{Error, Result};
pub use observation::{
    Distribution, EmotionObservation, FaceEntry, Region, Source, NEUTRAL_LABEL, UNKNOWN_LABEL,
};
pub use gate::{ConfidenceGate, CONFIDENCE_FLOOR};
pub use registry::SharedEmotionRegistry;
pub use latest::LatestCell;
pub use capture_state::{CaptureState, LoopGuard, LoopPhase};
