//! Axum HTTP API server for colorblindness simulation of uploaded videos.
//!
//! This crate provides:
//! - `POST /process-video` backed by FFmpeg's `colorchannelmixer`
//! - Published outputs under `/files/{name}` with deferred cleanup
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{ProcessOutcome, VideoProcessor};
pub use state::AppState;
