//! Shared data models for the colorblind video filter service.
//!
//! This crate provides Serde-serializable types for:
//! - Simulation modes
//! - Processing query parameters
//! - API response bodies

pub mod mode;
pub mod request;
pub mod response;

// Re-export common types
pub use mode::{ModeParseError, SimulationMode};
pub use request::{ProcessQuery, DEFAULT_CRF, DEFAULT_PRESET, MAX_CRF, MIN_CRF};
pub use response::{ProcessResponse, ServiceInfo, FFMPEG_FAILED};
