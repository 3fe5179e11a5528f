use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::color::{Channel, ColorMasks};
use crate::consts::{MIN_TILE_SAMPLES, SUPER_PIXEL};
use crate::error::Result;

use super::stats::{median, sigma_clipped_stats};

/// Tiling of a frame into background boxes.
///
/// Boxes are super-pixel multiples from the configuration; when a dimension
/// does not divide evenly the trailing tile is truncated.
#[derive(Clone, Copy, Debug)]
pub struct TileGrid {
    pub box_rows: usize,
    pub box_cols: usize,
    pub tile_rows: usize,
    pub tile_cols: usize,
}

impl TileGrid {
    pub fn new(frame_dims: (usize, usize), box_dims: (usize, usize)) -> Self {
        let (rows, cols) = frame_dims;
        // Boxes stay whole super-pixel multiples so tile edges never split a
        // color cell.
        let box_rows = snap_box(box_dims.0, rows);
        let box_cols = snap_box(box_dims.1, cols);
        Self {
            box_rows,
            box_cols,
            tile_rows: rows.div_ceil(box_rows),
            tile_cols: cols.div_ceil(box_cols),
        }
    }

    /// Grid cell containing a (x, y) pixel position.
    pub fn cell_of(&self, x: f64, y: f64) -> (usize, usize) {
        let cx = (x.max(0.0) as usize / self.box_cols).min(self.tile_cols - 1);
        let cy = (y.max(0.0) as usize / self.box_rows).min(self.tile_rows - 1);
        (cx, cy)
    }

    fn tile_bounds(
        &self,
        ty: usize,
        tx: usize,
        dims: (usize, usize),
    ) -> (usize, usize, usize, usize) {
        let r0 = ty * self.box_rows;
        let r1 = (r0 + self.box_rows).min(dims.0);
        let c0 = tx * self.box_cols;
        let c1 = (c0 + self.box_cols).min(dims.1);
        (r0, r1, c0, c1)
    }
}

/// Largest super-pixel multiple of `requested` that fits in `dim`.
fn snap_box(requested: usize, dim: usize) -> usize {
    let capped = requested.min(dim).max(SUPER_PIXEL);
    (capped / SUPER_PIXEL) * SUPER_PIXEL
}

/// Fit the tiled background model of one channel.
///
/// Per tile: sigma-clipped median over in-mask pixels; tiles with too few
/// samples inherit the global median. The tile grid is then smoothed with a
/// 3x3 median filter before the model is expanded to pixel resolution
/// (zero outside the mask).
pub fn channel_background_model(
    data: &Array2<f32>,
    mask: &Array2<bool>,
    grid: &TileGrid,
    sigma: f64,
    max_iters: usize,
) -> Array2<f32> {
    let dims = data.dim();
    let n_tiles = grid.tile_rows * grid.tile_cols;

    // Per-tile clipped medians, parallel over tiles.
    let tile_medians: Vec<Option<f64>> = (0..n_tiles)
        .into_par_iter()
        .map(|tile| {
            let (ty, tx) = (tile / grid.tile_cols, tile % grid.tile_cols);
            let (r0, r1, c0, c1) = grid.tile_bounds(ty, tx, dims);
            let mut sample = Vec::with_capacity((r1 - r0) * (c1 - c0));
            for row in r0..r1 {
                for col in c0..c1 {
                    if mask[[row, col]] {
                        sample.push(data[[row, col]]);
                    }
                }
            }
            if sample.len() < MIN_TILE_SAMPLES {
                return None;
            }
            Some(sigma_clipped_stats(&sample, sigma, max_iters).median)
        })
        .collect();

    let valid: Vec<f64> = tile_medians.iter().flatten().copied().collect();
    let global = if valid.is_empty() { 0.0 } else { median(&valid) };
    let filled: Vec<f64> = tile_medians
        .iter()
        .map(|m| m.unwrap_or(global))
        .collect();

    let smoothed = median_filter_grid(&filled, grid.tile_rows, grid.tile_cols);

    let mut model = Array2::<f32>::zeros(dims);
    for ty in 0..grid.tile_rows {
        for tx in 0..grid.tile_cols {
            let value = smoothed[ty * grid.tile_cols + tx] as f32;
            let (r0, r1, c0, c1) = grid.tile_bounds(ty, tx, dims);
            for row in r0..r1 {
                for col in c0..c1 {
                    if mask[[row, col]] {
                        model[[row, col]] = value;
                    }
                }
            }
        }
    }
    model
}

/// Subtract the per-channel tiled background models from one frame slab,
/// in place. Channel masks are disjoint, so each channel's statistics read
/// only pixels untouched by the other subtractions.
pub fn subtract_frame_models(
    slab: &mut Array2<f32>,
    masks: &ColorMasks,
    grid: &TileGrid,
    sigma: f64,
    max_iters: usize,
) -> Result<()> {
    for channel in Channel::ALL {
        let model = channel_background_model(slab, masks.channel(channel), grid, sigma, max_iters);
        let level: Vec<f64> = model
            .iter()
            .zip(masks.channel(channel).iter())
            .filter(|(_, &m)| m)
            .map(|(&v, _)| v as f64)
            .collect();
        if !level.is_empty() {
            debug!(
                channel = channel.label(),
                median = median(&level),
                "channel background model"
            );
        }
        *slab -= &model;
    }
    Ok(())
}

/// 3x3 median filter over the tile grid, clamped at the edges.
fn median_filter_grid(grid_values: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0f64; grid_values.len()];
    let mut neighbors = Vec::with_capacity(9);
    for ty in 0..rows {
        for tx in 0..cols {
            neighbors.clear();
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let ny = ty as i64 + dy;
                    let nx = tx as i64 + dx;
                    if ny >= 0 && ny < rows as i64 && nx >= 0 && nx < cols as i64 {
                        neighbors.push(grid_values[ny as usize * cols + nx as usize]);
                    }
                }
            }
            out[ty * cols + tx] = median(&neighbors);
        }
    }
    out
}
