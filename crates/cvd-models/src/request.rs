//! Query parameters for video processing requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::mode::SimulationMode;

/// Lowest accepted constant rate factor.
pub const MIN_CRF: u8 = 18;
/// Highest accepted constant rate factor.
pub const MAX_CRF: u8 = 32;
/// CRF used when the client does not send one.
pub const DEFAULT_CRF: u8 = 23;
/// x264 preset used when the client does not send one.
pub const DEFAULT_PRESET: &str = "veryfast";

/// Query string of `POST /process-video`.
///
/// `preset` is forwarded to the encoder verbatim; valid values are defined by x264.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ProcessQuery {
    #[serde(default)]
    pub filter: SimulationMode,

    /// Quality setting (lower = better)
    #[serde(default = "default_crf")]
    #[validate(range(min = 18, max = 32))]
    pub crf: u8,

    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_crf() -> u8 {
    DEFAULT_CRF
}

fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}

impl Default for ProcessQuery {
    fn default() -> Self {
        Self {
            filter: SimulationMode::default(),
            crf: DEFAULT_CRF,
            preset: default_preset(),
        }
    }
}
