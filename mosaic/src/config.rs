//! Stitch configuration describing how camera axes relate to stage axes.
//!
//! The configuration is fixed for one stitch call and passed in explicitly.
//! It can be stored next to an acquisition as JSON:
//!
//! ```json
//! { "x_inverted": false, "y_inverted": true, "swap_axes": false, "rotation": 3 }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{StitchError, StitchResult};

/// Counter-clockwise rotation applied to every field before placement.
///
/// Serialized as the number of quarter turns (0 to 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    /// Build a rotation from a count of 90 degree turns.
    ///
    /// Only 0..=3 are accepted; anything else is a configuration error rather
    /// than being reduced modulo four.
    pub fn from_quarter_turns(turns: u8) -> StitchResult<Self> {
        match turns {
            0 => Ok(Rotation::None),
            1 => Ok(Rotation::Quarter),
            2 => Ok(Rotation::Half),
            3 => Ok(Rotation::ThreeQuarter),
            other => Err(StitchError::config(format!(
                "rotation must be 0-3 quarter turns, got {other}"
            ))),
        }
    }

    pub fn quarter_turns(&self) -> u8 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 1,
            Rotation::Half => 2,
            Rotation::ThreeQuarter => 3,
        }
    }

    /// True when the rotation exchanges width and height.
    pub fn swaps_dimensions(&self) -> bool {
        self.quarter_turns() % 2 == 1
    }
}

impl TryFrom<u8> for Rotation {
    type Error = StitchError;

    fn try_from(turns: u8) -> Result<Self, Self::Error> {
        Rotation::from_quarter_turns(turns)
    }
}

impl From<Rotation> for u8 {
    fn from(rotation: Rotation) -> Self {
        rotation.quarter_turns()
    }
}

/// Axis orientation of the stage relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StitchConfig {
    /// Moving the sample right is a negative x stage change
    #[serde(default)]
    pub x_inverted: bool,
    /// Moving the sample up is a negative y stage change
    #[serde(default)]
    pub y_inverted: bool,
    /// Camera x/y are transposed relative to stage x/y
    #[serde(default)]
    pub swap_axes: bool,
    #[serde(default)]
    pub rotation: Rotation,
}

impl StitchConfig {
    pub fn new(x_inverted: bool, y_inverted: bool, swap_axes: bool, rotation: Rotation) -> Self {
        Self {
            x_inverted,
            y_inverted,
            swap_axes,
            rotation,
        }
    }

    /// Klamath light-sheet: camera and stage axes already agree.
    pub fn klamath() -> Self {
        Self::default()
    }

    /// Willamette light-sheet: camera is mounted three quarter turns off the stage.
    pub fn willamette() -> Self {
        Self {
            rotation: Rotation::ThreeQuarter,
            ..Self::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn save_to_file(&self, path: &Path) -> StitchResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StitchError::config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> StitchResult<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            StitchError::config(format!("invalid stitch config {}: {e}", path.display()))
        })
    }
}
