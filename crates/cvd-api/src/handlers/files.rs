//! `GET /files/{name}`: published outputs, until cleanup removes them.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use cvd_media::is_artifact_name;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Serve a published output file.
///
/// Only generated output names are accepted, so scratch inputs and anything
/// outside the scratch directory cannot be fetched. Range requests are
/// handled by `ServeFile`.
pub async fn get_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    if !is_artifact_name(&name) {
        return Err(ApiError::not_found(format!("file '{}'", name)));
    }

    let path = state.config.scratch_dir.join(&name);
    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if response.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::not_found(format!("file '{}'", name)));
    }

    Ok(response.map(Body::new))
}
