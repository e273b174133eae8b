//! Application state.

use std::sync::Arc;

use cvd_media::{sweep_stale, FfmpegRunner, SweepScope};
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::services::VideoProcessor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub processor: Arc<VideoProcessor>,
}

impl AppState {
    /// Create new application state, making sure the scratch directory exists.
    ///
    /// Job files left by a previous run that are older than the retention
    /// window are removed; their deferred deletes died with that process.
    pub async fn new(config: ApiConfig) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(&config.scratch_dir).await?;

        match sweep_stale(&config.scratch_dir, config.artifact_retention, SweepScope::All).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed stale scratch files"),
            Err(e) => warn!("Failed to sweep scratch dir: {}", e),
        }

        let runner = FfmpegRunner::new()
            .with_program(config.ffmpeg_path.clone())
            .with_timeout(config.ffmpeg_timeout_secs);
        let processor = VideoProcessor::new(runner, config.max_concurrent_jobs);

        Ok(Self {
            config: Arc::new(config),
            processor: Arc::new(processor),
        })
    }
}
