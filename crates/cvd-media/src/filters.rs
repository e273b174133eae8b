//! FFmpeg video filter definitions for colorblindness simulation.
//!
//! Each simulation mode maps to one fixed `colorchannelmixer` matrix. The
//! table is data, not behavior: there is no per-request computation beyond
//! the lookup and formatting.

use std::fmt;

use cvd_models::SimulationMode;

/// Filter expression that leaves every frame unchanged.
pub const FILTER_PASSTHROUGH: &str = "null";

/// Linear color transform applied per pixel by `colorchannelmixer`.
///
/// Rows are the output channels R, G, B; each row holds the weights of the
/// input channels `[r, g, b, a]`. The alpha weight is always zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix {
    pub rows: [[f64; 4]; 3],
}

impl ColorMatrix {
    /// Matrix equivalent to [`FILTER_PASSTHROUGH`].
    pub const PASSTHROUGH: ColorMatrix = ColorMatrix {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    /// R' = 0.625 R + 0.375 G, G' = 0.7 R + 0.3 G, B' = 0.3 G + 0.7 B
    pub const RED_GREEN_MERGE: ColorMatrix = ColorMatrix {
        rows: [
            [0.625, 0.375, 0.0, 0.0],
            [0.700, 0.300, 0.0, 0.0],
            [0.0, 0.300, 0.700, 0.0],
        ],
    };

    /// R' = 0.95 R + 0.05 G, G' = 0.43333 G + 0.56667 B, B' = 0.475 G + 0.525 B
    pub const BLUE_YELLOW_MERGE: ColorMatrix = ColorMatrix {
        rows: [
            [0.950, 0.050, 0.0, 0.0],
            [0.0, 0.43333, 0.56667, 0.0],
            [0.0, 0.475, 0.525, 0.0],
        ],
    };

    /// The twelve coefficients in `rr:rg:rb:ra:gr:gg:gb:ga:br:bg:bb:ba` order.
    pub fn coefficients(&self) -> [f64; 12] {
        let mut out = [0.0; 12];
        for (i, value) in self.rows.iter().flatten().enumerate() {
            out[i] = *value;
        }
        out
    }

    /// Whether this matrix leaves every channel unchanged.
    pub fn is_passthrough(&self) -> bool {
        *self == Self::PASSTHROUGH
    }

    /// Render as an ffmpeg `-vf` expression.
    pub fn to_filter_expr(&self) -> String {
        format!("colorchannelmixer={}", self)
    }
}

impl fmt::Display for ColorMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.coefficients().iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(":"))
    }
}

/// Matrix for a simulation mode.
///
/// NOTE: `identity`, `deuteranopia` and `tritanopia` share one matrix, and
/// `identity` is not a pass-through. The assignment is kept as deployed until
/// the product owner confirms the intended coefficients.
pub fn matrix_for(mode: SimulationMode) -> ColorMatrix {
    match mode {
        SimulationMode::Identity => ColorMatrix::BLUE_YELLOW_MERGE,
        SimulationMode::Protanopia => ColorMatrix::RED_GREEN_MERGE,
        SimulationMode::Deuteranopia => ColorMatrix::BLUE_YELLOW_MERGE,
        SimulationMode::Tritanopia => ColorMatrix::BLUE_YELLOW_MERGE,
    }
}

/// Matrix for a raw mode name. `None` means "no filter".
pub fn matrix_for_name(name: &str) -> Option<ColorMatrix> {
    name.parse::<SimulationMode>().ok().map(matrix_for)
}

/// Build the `-vf` argument for a raw mode name, falling back to the
/// pass-through filter for anything unrecognized.
pub fn video_filter_for(name: &str) -> String {
    match matrix_for_name(name) {
        Some(matrix) => matrix.to_filter_expr(),
        None => FILTER_PASSTHROUGH.to_string(),
    }
}
