pub mod catalog;
pub mod config;
pub mod info;
pub mod reduce;
pub mod variance;

use std::path::Path;

use anyhow::Result;
use procyon_core::config::ObservationConfig;

/// Load the observation config, or defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ObservationConfig> {
    Ok(match path {
        Some(path) => ObservationConfig::from_toml_file(path)?,
        None => ObservationConfig::default(),
    })
}
