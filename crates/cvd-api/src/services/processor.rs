//! Colorblindness simulation of one uploaded video.

use std::sync::Arc;

use cvd_media::{simulation_command, video_filter_for, FfmpegRunner, MediaResult, ScratchJob};
use cvd_models::SimulationMode;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Result of running the transcoder for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Output file written at the job's output path.
    Published,
    /// Transcoder exited unsuccessfully; the input has already been removed.
    TranscoderFailed { detail: String },
}

/// Runs the simulation filter through FFmpeg.
#[derive(Clone)]
pub struct VideoProcessor {
    runner: FfmpegRunner,
    /// Bounds simultaneous FFmpeg processes when set
    limiter: Option<Arc<Semaphore>>,
}

impl VideoProcessor {
    /// `max_concurrent_jobs == 0` means unlimited.
    pub fn new(runner: FfmpegRunner, max_concurrent_jobs: usize) -> Self {
        Self {
            runner,
            limiter: (max_concurrent_jobs > 0).then(|| Arc::new(Semaphore::new(max_concurrent_jobs))),
        }
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    /// Transcode the job's input with the matrix for `mode`.
    ///
    /// Transcoder failures are reported as [`ProcessOutcome::TranscoderFailed`]
    /// after the input has been deleted. Anything else (missing binary, spawn
    /// failure) is an error.
    pub async fn process(
        &self,
        job: &ScratchJob,
        mode: SimulationMode,
        crf: u8,
        preset: &str,
    ) -> ApiResult<ProcessOutcome> {
        let filter = video_filter_for(mode.as_str());
        let cmd = simulation_command(job.input_path(), job.output_path(), filter, preset, crf);

        let result = self.run_limited(&cmd).await?;

        match result {
            Ok(elapsed) => {
                info!(
                    job_id = %job.id(),
                    filter = %mode,
                    crf,
                    preset,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Video processed"
                );
                metrics::record_ffmpeg_duration(mode.as_str(), elapsed.as_secs_f64());
                metrics::record_job_completed(mode.as_str());
                Ok(ProcessOutcome::Published)
            }
            Err(e) if e.is_transcoder_failure() => {
                warn!(job_id = %job.id(), filter = %mode, "FFmpeg failed: {}", e);
                job.remove_input().await;
                job.remove_output().await;
                metrics::record_job_failed(mode.as_str(), "ffmpeg_failed");
                Ok(ProcessOutcome::TranscoderFailed { detail: e.detail() })
            }
            Err(e) => {
                metrics::record_job_failed(mode.as_str(), "internal");
                Err(ApiError::from(e))
            }
        }
    }

    /// Run the command, holding a permit for its whole duration when limited.
    async fn run_limited(
        &self,
        cmd: &cvd_media::FfmpegCommand,
    ) -> ApiResult<MediaResult<std::time::Duration>> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                Arc::clone(limiter)
                    .acquire_owned()
                    .await
                    .map_err(|_| ApiError::internal("job limiter closed"))?,
            ),
            None => None,
        };

        metrics::adjust_active_jobs(1.0);
        let _active = scopeguard::guard((), |_| metrics::adjust_active_jobs(-1.0));

        Ok(self.runner.run(cmd).await)
    }
}
