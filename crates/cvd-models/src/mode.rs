//! Colorblindness simulation modes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Color vision deficiency being simulated, or the `identity` baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Baseline mode
    Identity,
    /// Red-blind (missing L cones)
    #[default]
    Protanopia,
    /// Green-blind (missing M cones)
    Deuteranopia,
    /// Blue-blind (missing S cones)
    Tritanopia,
}

impl SimulationMode {
    /// All accepted modes, in the order they are documented.
    pub const ALL: &'static [SimulationMode] = &[
        SimulationMode::Protanopia,
        SimulationMode::Deuteranopia,
        SimulationMode::Tritanopia,
        SimulationMode::Identity,
    ];

    /// Returns the mode name as accepted on the query string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationMode::Identity => "identity",
            SimulationMode::Protanopia => "protanopia",
            SimulationMode::Deuteranopia => "deuteranopia",
            SimulationMode::Tritanopia => "tritanopia",
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsing is exact: `Protanopia` is not a valid mode.
impl FromStr for SimulationMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(SimulationMode::Identity),
            "protanopia" => Ok(SimulationMode::Protanopia),
            "deuteranopia" => Ok(SimulationMode::Deuteranopia),
            "tritanopia" => Ok(SimulationMode::Tritanopia),
            _ => Err(ModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown simulation mode: {0}")]
pub struct ModeParseError(String);
