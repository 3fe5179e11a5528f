use ndarray::Array3;
use tracing::{debug, warn};

use crate::error::{ProcyonError, Result};
use crate::io::store::{DataStore, Dataset};

/// Key of the pairwise variance matrix in the subtracted store.
pub const VGRID_KEY: &str = "vgrid";

/// Key of one source's background-subtracted stamp cube.
pub fn subtracted_key(source_index: usize) -> String {
    format!("subtracted/{source_index}")
}

/// Open the variance grid, creating it NaN-filled on first use.
///
/// NaN is the "not yet computed" sentinel: a genuinely zero variance
/// (identical normalized stamps) stays distinguishable from an untouched
/// cell, so resumed runs never recompute or falsely skip a pair.
pub fn open_vgrid(store: &mut DataStore, num_sources: usize) -> Result<Dataset> {
    if store.has_dataset(VGRID_KEY) {
        let grid = store.open_dataset(VGRID_KEY)?;
        if grid.shape() != [num_sources, num_sources] {
            return Err(ProcyonError::Store(format!(
                "variance grid shape {:?} does not match source count {num_sources}",
                grid.shape()
            )));
        }
        return Ok(grid);
    }
    store.create_dataset(VGRID_KEY, &[num_sources, num_sources], f32::NAN)
}

/// Load and flux-normalize one source's stamp cube.
fn normalized_cube(store: &DataStore, source_index: usize) -> Result<Array3<f64>> {
    let dataset = store.open_dataset(&subtracted_key(source_index))?;
    let cube = dataset.read_cube()?;
    let mut cube = cube.mapv(|v| v as f64);
    let total: f64 = cube.iter().sum();
    if total != 0.0 {
        cube /= total;
    }
    Ok(cube)
}

/// Fill the target's row (and symmetric column) of the variance grid.
///
/// For every other source whose pair with the target is still unset, loads
/// that source's cube, normalizes it, and stores the summed squared
/// pixel-wise difference across the whole stack. Incompatible or missing
/// stamp cubes are logged and skipped; their cells stay NaN. Already-set
/// pairs are left untouched, so interrupted passes resume where they
/// stopped.
///
/// Returns the skipped source indices.
pub fn compute_variance(
    store: &mut DataStore,
    target_index: usize,
    num_sources: usize,
) -> Result<Vec<usize>> {
    if target_index >= num_sources {
        return Err(ProcyonError::SourceIndexOutOfRange {
            index: target_index,
            total: num_sources,
        });
    }

    let mut grid = open_vgrid(store, num_sources)?;
    let target = normalized_cube(store, target_index)?;
    debug!(target_index, "normalized target stamp cube");

    let mut skipped = Vec::new();

    for other in 0..num_sources {
        let already = !grid.get(target_index, other)?.is_nan()
            && !grid.get(other, target_index)?.is_nan();
        if already {
            continue;
        }

        let cube = match normalized_cube(store, other) {
            Ok(cube) => cube,
            Err(e) => {
                warn!(source_index = other, error = %e, "skipping source without stamp cube");
                skipped.push(other);
                continue;
            }
        };

        if cube.dim() != target.dim() {
            let (n, h, w) = target.dim();
            let (an, ah, aw) = cube.dim();
            warn!(
                source_index = other,
                error = %ProcyonError::StampShapeMismatch {
                    expected: (n, h, w),
                    actual: (an, ah, aw),
                },
                "skipping incompatible stamp cube"
            );
            skipped.push(other);
            continue;
        }

        let sum_sq: f64 = target
            .iter()
            .zip(cube.iter())
            .map(|(&a, &b)| (a - b) * (a - b))
            .sum();

        let value = sum_sq as f32;
        grid.set(target_index, other, value)?;
        grid.set(other, target_index, value)?;
    }

    grid.flush()?;
    Ok(skipped)
}
