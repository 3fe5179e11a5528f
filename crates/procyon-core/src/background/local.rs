use std::collections::HashMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::color::{Channel, ColorMasks};
use crate::consts::{
    BACKGROUND_SAMPLE_CAP, DEFAULT_CLIP_ITERS, DEFAULT_CLIP_SIGMA, DEFAULT_SOURCE_MASK_SNR,
};

use super::model::TileGrid;
use super::stats::{median, sigma_clipped_stats, ClippedStats};

/// Which clipped statistic is subtracted as the background level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundStat {
    Mean,
    #[default]
    Median,
}

impl BackgroundStat {
    fn pick(&self, stats: &ClippedStats) -> f64 {
        match self {
            BackgroundStat::Mean => stats.mean,
            BackgroundStat::Median => stats.median,
        }
    }
}

/// Parameters for stamp-level background subtraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalBackgroundParams {
    /// Sigma threshold for clipped statistics.
    pub sigma: f64,
    /// Sigma-clipping iteration cap.
    pub max_iters: usize,
    /// SNR above the clipped median at which a pixel counts as source signal
    /// and is excluded from the background sample.
    pub source_snr: f64,
    /// Statistic subtracted as the background level.
    pub stat: BackgroundStat,
    /// Samples cached per (frame, cell, channel) before reuse kicks in.
    pub sample_cap: usize,
}

impl Default for LocalBackgroundParams {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_CLIP_SIGMA,
            max_iters: DEFAULT_CLIP_ITERS,
            source_snr: DEFAULT_SOURCE_MASK_SNR,
            stat: BackgroundStat::default(),
            sample_cap: BACKGROUND_SAMPLE_CAP,
        }
    }
}

/// Composite key for one background sample list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackgroundKey {
    pub frame_index: usize,
    /// Background grid cell, (col_cell, row_cell).
    pub cell: (usize, usize),
    pub channel: Channel,
}

/// Accumulated background samples, bounded per key.
///
/// Nearby stamps share background conditions; capping samples per grid cell
/// amortizes the fitting cost while tracking spatial variation.
#[derive(Debug, Default)]
pub struct SampleCache {
    samples: HashMap<BackgroundKey, Vec<ClippedStats>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples_for(&self, key: &BackgroundKey) -> Option<&[ClippedStats]> {
        self.samples.get(key).map(|v| v.as_slice())
    }

    pub fn key_count(&self) -> usize {
        self.samples.len()
    }
}

/// Subtract the per-channel sky background from one stamp.
///
/// The sample list for the stamp's background grid cell grows until
/// `sample_cap`; after that, subtraction reuses the cached statistics. The
/// value subtracted is always the running median (across cached samples) of
/// the configured statistic, smoothing estimates across nearby stamps that
/// share a cell. Output recombines the three mask-isolated channels,
/// zero-filled outside each mask.
pub fn subtract_stamp_background(
    stamp: &Array2<f32>,
    frame_index: usize,
    masks: &ColorMasks,
    mid_point: (f64, f64),
    grid: &TileGrid,
    cache: &mut SampleCache,
    params: &LocalBackgroundParams,
) -> Array2<f32> {
    let cell = grid.cell_of(mid_point.0, mid_point.1);
    debug!(frame_index, ?cell, "stamp background region");

    let needs_sample = Channel::ALL.iter().any(|&channel| {
        let key = BackgroundKey {
            frame_index,
            cell,
            channel,
        };
        cache.samples.get(&key).map_or(0, |v| v.len()) < params.sample_cap
    });

    // The source-exclusion mask is shared by all three channels and only
    // needed when at least one of them still accumulates samples.
    let source_mask = needs_sample.then(|| source_mask(stamp, params));

    let mut subtracted = Array2::<f32>::zeros(stamp.dim());

    for channel in Channel::ALL {
        let key = BackgroundKey {
            frame_index,
            cell,
            channel,
        };
        let channel_mask = masks.channel(channel);
        let samples = cache.samples.entry(key).or_default();

        if samples.len() < params.sample_cap {
            let exclusion = source_mask.as_ref().expect("mask built when sampling");
            let sample: Vec<f32> = stamp
                .iter()
                .zip(channel_mask.iter())
                .zip(exclusion.iter())
                .filter_map(|((&v, &in_channel), &is_source)| {
                    (in_channel && !is_source).then_some(v)
                })
                .collect();
            samples.push(sigma_clipped_stats(&sample, params.sigma, params.max_iters));
        }

        let levels: Vec<f64> = samples.iter().map(|s| params.stat.pick(s)).collect();
        let level = median(&levels) as f32;
        debug!(
            frame_index,
            channel = channel.label(),
            level,
            samples = samples.len(),
            "subtracting channel background"
        );

        for ((row, col), &in_channel) in channel_mask.indexed_iter() {
            if in_channel {
                subtracted[[row, col]] = stamp[[row, col]] - level;
            }
        }
    }

    subtracted
}

/// Flag pixels carrying source signal: above the clipped median by
/// `source_snr` standard deviations, grown by one binary dilation to cover
/// the wings.
fn source_mask(stamp: &Array2<f32>, params: &LocalBackgroundParams) -> Array2<bool> {
    let flat: Vec<f32> = stamp.iter().copied().collect();
    let stats = sigma_clipped_stats(&flat, params.sigma, params.max_iters);
    let threshold = (stats.median + params.source_snr * stats.stddev) as f32;

    let thresholded = stamp.mapv(|v| v > threshold);
    dilate(&thresholded)
}

/// One 3x3 binary dilation pass.
fn dilate(mask: &Array2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let mut out = Array2::from_elem((rows, cols), false);
    for row in 0..rows {
        for col in 0..cols {
            if !mask[[row, col]] {
                continue;
            }
            for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    let nr = row as i64 + dr;
                    let nc = col as i64 + dc;
                    if nr >= 0 && nr < rows as i64 && nc >= 0 && nc < cols as i64 {
                        out[[nr as usize, nc as usize]] = true;
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::make_masks;

    fn flat_stamp(rows: usize, cols: usize, level: f32) -> Array2<f32> {
        Array2::from_elem((rows, cols), level)
    }

    #[test]
    fn flat_stamp_subtracts_to_zero() {
        let stamp = flat_stamp(8, 8, 40.0);
        let masks = make_masks((8, 8));
        let grid = TileGrid::new((100, 100), (50, 50));
        let mut cache = SampleCache::new();
        let params = LocalBackgroundParams::default();

        let out = subtract_stamp_background(
            &stamp,
            0,
            &masks,
            (25.0, 25.0),
            &grid,
            &mut cache,
            &params,
        );
        for &v in out.iter() {
            assert!(v.abs() < 1e-5, "residual {v}");
        }
    }

    #[test]
    fn sample_cap_is_honored() {
        let masks = make_masks((8, 8));
        let grid = TileGrid::new((100, 100), (50, 50));
        let mut cache = SampleCache::new();
        let params = LocalBackgroundParams::default();

        for _ in 0..10 {
            let stamp = flat_stamp(8, 8, 12.0);
            subtract_stamp_background(&stamp, 0, &masks, (25.0, 25.0), &grid, &mut cache, &params);
        }
        let key = BackgroundKey {
            frame_index: 0,
            cell: (0, 0),
            channel: Channel::Red,
        };
        assert_eq!(cache.samples_for(&key).unwrap().len(), params.sample_cap);
    }

    #[test]
    fn bright_source_pixels_do_not_bias_background() {
        let mut stamp = flat_stamp(16, 16, 10.0);
        // A tight bright blob in the middle.
        for row in 7..9 {
            for col in 7..9 {
                stamp[[row, col]] = 10_000.0;
            }
        }
        let masks = make_masks((16, 16));
        let grid = TileGrid::new((100, 100), (50, 50));
        let mut cache = SampleCache::new();
        let params = LocalBackgroundParams::default();

        let out = subtract_stamp_background(
            &stamp,
            3,
            &masks,
            (25.0, 25.0),
            &grid,
            &mut cache,
            &params,
        );
        // Background pixels end up near zero; the blob keeps its flux.
        assert!(out[[0, 0]].abs() < 1e-3);
        assert!(out[[7, 7]] > 9_000.0);
    }
}
