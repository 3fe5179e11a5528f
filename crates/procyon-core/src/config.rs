use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::background::LocalBackgroundParams;
use crate::catalog::DetectionConfig;
use crate::consts::{
    DEFAULT_APERTURE_SIZE, DEFAULT_BACKGROUND_BOX_COLS, DEFAULT_BACKGROUND_BOX_ROWS,
    DEFAULT_CAMERA_BIAS, DEFAULT_EDGE_MARGIN,
};
use crate::error::{ProcyonError, Result};

/// Settings of one observation session.
///
/// Every component receives these through the session object; nothing reads
/// process-global state. TOML-loadable with per-field defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Built-in camera bias (ADU), removed when frames enter the cube.
    pub camera_bias: f32,
    /// Catalog edge-exclusion margin, pixels.
    pub edge_margin: f64,
    /// Background box height, rows. Should be a super-pixel multiple.
    pub background_box_rows: usize,
    /// Background box width, cols. Should be a super-pixel multiple.
    pub background_box_cols: usize,
    /// Stamp-level background subtraction parameters.
    pub background: LocalBackgroundParams,
    /// Photometry aperture side, pixels.
    pub aperture_size: usize,
    /// Frame number the catalog is built from.
    pub reference_frame: usize,
    /// External source-detection settings.
    pub detection: DetectionConfig,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            camera_bias: DEFAULT_CAMERA_BIAS,
            edge_margin: DEFAULT_EDGE_MARGIN,
            background_box_rows: DEFAULT_BACKGROUND_BOX_ROWS,
            background_box_cols: DEFAULT_BACKGROUND_BOX_COLS,
            background: LocalBackgroundParams::default(),
            aperture_size: DEFAULT_APERTURE_SIZE,
            reference_frame: 0,
            detection: DetectionConfig::default(),
        }
    }
}

impl ObservationConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ProcyonError::Config(e.to_string()))
    }
}
