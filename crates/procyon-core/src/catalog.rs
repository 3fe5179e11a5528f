use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProcyonError, Result};

/// One catalog entry: a detected point source.
///
/// Pixel coordinates are zero-based, in the reference frame the catalog was
/// built from. Immutable after catalog load.
#[derive(Clone, Debug)]
pub struct PointSource {
    /// Position in the filtered catalog; indexes tracks, stamps and the
    /// variance grid.
    pub index: usize,
    /// Right ascension, degrees (J2000).
    pub ra: f64,
    /// Declination, degrees (J2000).
    pub dec: f64,
    /// Reference-frame pixel x.
    pub x: f64,
    /// Reference-frame pixel y.
    pub y: f64,
}

/// Settings for the external source-detection tool.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Detection configuration file passed via `-c`.
    pub config_file: Option<PathBuf>,
    /// Extra command-line parameters, passed through verbatim.
    #[serde(default)]
    pub extra_params: Vec<String>,
}

/// Catalog file path for a given reference frame number.
pub fn catalog_path(image_dir: &Path, frame_num: usize) -> PathBuf {
    image_dir.join(format!("point_sources_{frame_num:02}.cat"))
}

/// Load the point-source catalog, invoking the external detection tool if no
/// catalog file exists yet (or `force_new` is set).
///
/// Flagged detections are dropped, as are sources within `edge_margin`
/// pixels of the (height, width) frame edges, which guarantees stamp
/// extraction never runs off-frame.
pub fn lookup_point_sources(
    image_dir: &Path,
    reference_frame: &Path,
    frame_num: usize,
    frame_dims: (usize, usize),
    edge_margin: f64,
    detection: &DetectionConfig,
    force_new: bool,
) -> Result<Vec<PointSource>> {
    let path = catalog_path(image_dir, frame_num);
    debug!(catalog = %path.display(), "point source catalog");

    if !path.exists() || force_new {
        run_detection_tool(reference_frame, &path, detection)?;
    }

    let text = fs::read_to_string(&path)?;
    let sources = parse_catalog(&text, frame_dims, edge_margin)?;
    info!(count = sources.len(), "loaded point sources");
    Ok(sources)
}

/// Invoke the external detection tool to build a catalog.
fn run_detection_tool(
    reference_frame: &Path,
    catalog: &Path,
    detection: &DetectionConfig,
) -> Result<()> {
    let tool = find_tool(&["sextractor", "sex"])
        .ok_or_else(|| ProcyonError::ExternalToolMissing("sextractor".into()))?;

    let mut cmd = Command::new(&tool);
    if let Some(conf) = &detection.config_file {
        cmd.arg("-c").arg(conf);
    }
    cmd.arg("-CATALOG_NAME").arg(catalog);
    cmd.args(&detection.extra_params);
    cmd.arg(reference_frame);

    info!(tool = %tool.display(), frame = %reference_frame.display(), "running source detection");
    let status = cmd.status()?;
    if !status.success() {
        return Err(ProcyonError::Catalog(format!(
            "detection tool exited with {status}"
        )));
    }
    if !catalog.exists() {
        return Err(ProcyonError::Catalog(format!(
            "detection tool wrote no catalog at {}",
            catalog.display()
        )));
    }
    Ok(())
}

/// Locate the first of `names` on PATH.
fn find_tool(names: &[&str]) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        for name in names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Parse an ASCII-head catalog table.
///
/// Header lines look like `#   1 X_IMAGE   Object position along x   [pixel]`
/// and assign 1-based column numbers; data rows are whitespace-separated.
/// Rows with a nonzero FLAGS value are discarded, then the edge filter is
/// applied and survivors are re-indexed sequentially.
pub fn parse_catalog(
    text: &str,
    frame_dims: (usize, usize),
    edge_margin: f64,
) -> Result<Vec<PointSource>> {
    let mut columns: HashMap<String, usize> = HashMap::new();

    for line in text.lines().filter(|l| l.starts_with('#')) {
        let mut parts = line[1..].split_whitespace();
        if let (Some(num), Some(name)) = (parts.next(), parts.next()) {
            if let Ok(num) = num.parse::<usize>() {
                columns.insert(name.to_string(), num - 1);
            }
        }
    }

    let col = |name: &str| {
        columns
            .get(name)
            .copied()
            .ok_or_else(|| ProcyonError::Catalog(format!("catalog lacks column {name}")))
    };
    let x_col = col("X_IMAGE")?;
    let y_col = col("Y_IMAGE")?;
    let ra_col = col("ALPHA_J2000")?;
    let dec_col = col("DELTA_J2000")?;
    let flags_col = columns.get("FLAGS").copied();

    let (height, width) = frame_dims;
    let mut sources = Vec::new();

    for line in text.lines().filter(|l| !l.starts_with('#')) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let field = |idx: usize| -> Result<f64> {
            fields
                .get(idx)
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| ProcyonError::Catalog(format!("bad catalog row: {line}")))
        };

        if let Some(fc) = flags_col {
            if field(fc)? != 0.0 {
                continue;
            }
        }

        // Catalog positions are FITS 1-based.
        let x = field(x_col)? - 1.0;
        let y = field(y_col)? - 1.0;

        let inside = x > edge_margin
            && x < width as f64 - edge_margin
            && y > edge_margin
            && y < height as f64 - edge_margin;
        if !inside {
            continue;
        }

        sources.push(PointSource {
            index: sources.len(),
            ra: field(ra_col)?,
            dec: field(dec_col)?,
            x,
            y,
        });
    }

    Ok(sources)
}
