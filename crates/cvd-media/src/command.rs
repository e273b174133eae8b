//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Upper bound on the diagnostic text returned to clients, in bytes.
pub const MAX_STDERR_DETAIL: usize = 4000;

/// How much stderr is buffered while the process runs. The rest is drained
/// and discarded so the pipe never blocks the child.
const STDERR_CAPTURE_LIMIT: usize = 64 * 1024;

/// How long to keep reading stderr once the child has exited. Processes it
/// spawned may still hold the pipe open.
const STDERR_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Move the moov atom to the front so playback can start before download ends.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.extend(self.input_args.iter().cloned());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Colorblindness simulation encode: apply `video_filter`, re-encode video as
/// H.264 and copy audio untouched.
pub fn simulation_command(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    video_filter: impl Into<String>,
    preset: impl Into<String>,
    crf: u8,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .video_filter(video_filter)
        .video_codec("libx264")
        .preset(preset)
        .crf(crf)
        .faststart()
        .audio_codec("copy")
}

/// Runner for FFmpeg commands with stderr capture and timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Executable name or path
    program: PathBuf,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner that resolves `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout_secs: None,
        }
    }

    /// Use a specific executable instead of `ffmpeg` from `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set timeout. Zero disables it.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = (secs > 0).then_some(secs);
        self
    }

    /// Resolve the executable, failing if it cannot be found.
    pub fn check(&self) -> MediaResult<PathBuf> {
        which::which(&self.program)
            .map_err(|e| MediaError::FfmpegNotFound(format!("{}: {}", self.program.display(), e)))
    }

    /// Run an FFmpeg command to completion.
    ///
    /// A non-zero exit yields [`MediaError::FfmpegFailed`] carrying stderr
    /// truncated to [`MAX_STDERR_DETAIL`] bytes.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<Duration> {
        let program = self.check()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", program.display(), args.join(" "));

        let started = Instant::now();
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;
        let mut stderr_handle = tokio::spawn(capture_stderr(stderr));

        let status = self.wait_for_completion(&mut child).await;
        let stderr = match tokio::time::timeout(STDERR_DRAIN_GRACE, &mut stderr_handle).await {
            Ok(captured) => captured.unwrap_or_default(),
            Err(_) => {
                debug!("stderr still open after FFmpeg exited, abandoning capture");
                stderr_handle.abort();
                Vec::new()
            }
        };

        let status = status?;
        if status.success() {
            return Ok(started.elapsed());
        }

        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some(truncate_detail(&stderr, MAX_STDERR_DETAIL)),
            status.code(),
        ))
    }

    /// Wait for child process with timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<std::process::ExitStatus> {
        let Some(timeout_secs) = self.timeout_secs else {
            return Ok(child.wait().await?);
        };

        let waited = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await;
        match waited {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!("FFmpeg timed out after {} seconds, killing process", timeout_secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(timeout_secs))
            }
        }
    }
}

/// Read a stream to the end, keeping at most [`STDERR_CAPTURE_LIMIT`] bytes.
async fn capture_stderr<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = STDERR_CAPTURE_LIMIT.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }

    captured
}

/// Decode stderr lossily and cut it to at most `max_bytes`, on a char boundary.
pub fn truncate_detail(stderr: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    if text.len() <= max_bytes {
        return text.into_owned();
    }

    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Check if FFmpeg is available on `PATH`.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    FfmpegRunner::new().check()
}
