//! Response bodies returned by the API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Error code reported when the transcoder exits unsuccessfully.
pub const FFMPEG_FAILED: &str = "ffmpeg_failed";

/// Result of a processing request.
///
/// Both variants are sent with status 200; callers tell them apart by the
/// presence of `url` or `ok: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ProcessResponse {
    Success {
        url: String,
    },
    Failure {
        ok: bool,
        error: String,
        detail: String,
    },
}

impl ProcessResponse {
    pub fn success(url: impl Into<String>) -> Self {
        Self::Success { url: url.into() }
    }

    pub fn ffmpeg_failed(detail: impl Into<String>) -> Self {
        Self::Failure {
            ok: false,
            error: FFMPEG_FAILED.to_string(),
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Static info returned by `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServiceInfo {
    pub status: String,
    pub message: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            message: "Use POST /process-video (multipart/form-data)".to_string(),
        }
    }
}
