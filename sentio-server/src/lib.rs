//! sentio-server: HTTP and websocket surface of the sentio emotion pipeline
//!
//! `EmotionService` owns the shared state (capture flag, face registry,
//! latest voice result) and the two capture loops; `http::create_router`
//! exposes it.

pub mod config;
pub mod error;
pub mod state;
pub mod http;
pub mod ws;
pub mod startup;

pub use config::{Cli, ConfigError, SentioConfig};
pub use error::{ApiError, ServiceError};
pub use http::create_router;
pub use state::{EmotionService, ServiceParts};
