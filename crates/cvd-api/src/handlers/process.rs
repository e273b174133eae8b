//! `POST /process-video`: upload, simulate, publish.

use std::path::Path;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::WithRejection;
use cvd_media::ScratchJob;
use cvd_models::{ProcessQuery, ProcessResponse};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::{attach_to_response, cleanup_guard, ProcessOutcome};
use crate::state::AppState;

/// Multipart field carrying the video.
pub const UPLOAD_FIELD: &str = "file";

/// Accept a video via multipart/form-data and return JSON with a URL to the
/// processed MP4.
///
/// Transcoder failures are answered with status 200 and
/// `{"ok": false, "error": "ffmpeg_failed", "detail": ...}`; existing clients
/// check the body, not the status.
pub async fn process_video(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<ProcessQuery>, ApiError>,
    WithRejection(mut multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<Response> {
    query
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let field = loop {
        match multipart.next_field().await? {
            Some(field) if field.name() == Some(UPLOAD_FIELD) => break field,
            Some(_) => continue,
            None => {
                return Err(ApiError::validation(format!(
                    "missing multipart field '{}'",
                    UPLOAD_FIELD
                )))
            }
        }
    };

    let job = ScratchJob::new(&state.config.scratch_dir, field.file_name());
    let mut guard = cleanup_guard(&job);

    let bytes = persist_field(field, job.input_path()).await?;
    metrics::record_upload_bytes(bytes);
    debug!(job_id = %job.id(), bytes, "Upload saved");

    let outcome = state
        .processor
        .process(&job, query.filter, query.crf, &query.preset)
        .await?;

    match outcome {
        ProcessOutcome::Published => {
            let url = state.config.file_url(&job.output_file_name());
            info!(job_id = %job.id(), url = %url, "Output published");

            guard.output_retention = state.config.artifact_retention;
            let response = Json(ProcessResponse::success(url)).into_response();
            Ok(attach_to_response(response, guard))
        }
        ProcessOutcome::TranscoderFailed { detail } => {
            Ok(Json(ProcessResponse::ffmpeg_failed(detail)).into_response())
        }
    }
}

/// Write the whole field to `path`, returning the number of bytes written.
async fn persist_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
