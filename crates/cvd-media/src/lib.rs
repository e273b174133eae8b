//! FFmpeg CLI wrapper for colorblindness simulation.
//!
//! This crate provides:
//! - The fixed color matrix table per simulation mode
//! - Type-safe FFmpeg command building
//! - A runner with stderr capture and timeout
//! - Per-job scratch file naming and removal

pub mod command;
pub mod error;
pub mod filters;
pub mod scratch;

pub use command::{
    check_ffmpeg, simulation_command, truncate_detail, FfmpegCommand, FfmpegRunner,
    MAX_STDERR_DETAIL,
};
pub use error::{MediaError, MediaResult};
pub use filters::{matrix_for, matrix_for_name, video_filter_for, ColorMatrix, FILTER_PASSTHROUGH};
pub use scratch::{
    is_artifact_name, is_input_name, remove_file_if_exists, sanitize_file_name, sweep_stale,
    ScratchJob, SweepScope,
};
