//! Deferred removal of a job's scratch files.
//!
//! A [`CleanupGuard`] is armed as soon as a job's paths are allocated. Dropping
//! it schedules removal, so every exit path of a request cleans up. On success
//! the guard is moved into the response body with [`attach_to_response`] and
//! only fires once the body has been fully written or the connection dropped.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::response::Response;
use cvd_media::scratch::{remove_file_if_exists, remove_file_if_exists_blocking};
use cvd_media::{sweep_stale, ScratchJob, SweepScope};
use http_body::{Frame, SizeHint};
use scopeguard::ScopeGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;

/// Files to remove once a request is finished.
#[derive(Debug, Clone)]
pub struct CleanupPlan {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Delay before the output is removed. Zero unless the output was published.
    pub output_retention: Duration,
}

/// Guard that runs [`run_cleanup`] when dropped.
pub type CleanupGuard = ScopeGuard<CleanupPlan, fn(CleanupPlan)>;

/// Arm a cleanup guard for both scratch files of `job`.
pub fn cleanup_guard(job: &ScratchJob) -> CleanupGuard {
    let plan = CleanupPlan {
        input: job.input_path().to_path_buf(),
        output: job.output_path().to_path_buf(),
        output_retention: Duration::ZERO,
    };
    scopeguard::guard(plan, run_cleanup as fn(CleanupPlan))
}

/// Remove the input now and the output after its retention delay.
///
/// Runs on the current Tokio runtime when there is one, otherwise inline.
fn run_cleanup(plan: CleanupPlan) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if !remove_file_if_exists(&plan.input).await {
                    metrics::record_cleanup_failure();
                }
                if !plan.output_retention.is_zero() {
                    debug!(
                        output = %plan.output.display(),
                        retention_secs = plan.output_retention.as_secs(),
                        "Output scheduled for removal"
                    );
                    tokio::time::sleep(plan.output_retention).await;
                }
                if !remove_file_if_exists(&plan.output).await {
                    metrics::record_cleanup_failure();
                }
            });
        }
        Err(_) => {
            for path in [&plan.input, &plan.output] {
                if !remove_file_if_exists_blocking(path) {
                    metrics::record_cleanup_failure();
                }
            }
        }
    }
}

/// Lower bound for the periodic output sweep, so outputs still being written
/// are never considered stale.
const MIN_SWEEP_AGE: Duration = Duration::from_secs(60);

/// Periodically remove published outputs past their retention window.
///
/// Catches outputs whose deferred delete never ran, e.g. when a request task
/// was cancelled mid-sleep.
pub fn spawn_output_sweeper(dir: PathBuf, retention: Duration) -> JoinHandle<()> {
    let max_age = retention.max(MIN_SWEEP_AGE);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(max_age);
        // First tick fires immediately; startup already swept
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_outputs(&dir, max_age).await;
        }
    })
}

async fn sweep_outputs(dir: &Path, max_age: Duration) {
    match sweep_stale(dir, max_age, SweepScope::Outputs).await {
        Ok(0) => {}
        Ok(removed) => info!(removed, "Swept expired outputs"),
        Err(e) => {
            warn!("Failed to sweep scratch dir {}: {}", dir.display(), e);
            metrics::record_cleanup_failure();
        }
    }
}

/// Tie `guard` to the lifetime of the response body.
pub fn attach_to_response(response: Response, guard: CleanupGuard) -> Response {
    response.map(|inner| {
        Body::new(GuardedBody {
            inner,
            _guard: guard,
        })
    })
}

/// Body wrapper that keeps a cleanup guard alive until hyper drops it.
struct GuardedBody {
    inner: Body,
    _guard: CleanupGuard,
}

impl http_body::Body for GuardedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
