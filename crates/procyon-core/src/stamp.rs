use std::ops::Range;

use ndarray::{s, Array2, Array3};

use crate::color::{pixel_color, PixelColor};
use crate::consts::{STAMP_EXTRA_COLS, STAMP_EXTRA_ROWS, STAMP_PAD_MULTIPLE};
use crate::error::{ProcyonError, Result};

/// Half-open pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

/// Where a stamp sits, in frame coordinates and in its own coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CutoutGeometry {
    /// Stamp rectangle in the full frame.
    pub bbox_original: BoundingBox,
    /// The same rectangle in stamp-local coordinates.
    pub bbox_cutout: BoundingBox,
    /// (rows, cols) of the stamp.
    pub shape: (usize, usize),
}

impl CutoutGeometry {
    /// Stamp origin in the full frame, (row, col).
    pub fn origin(&self) -> (usize, usize) {
        (self.bbox_original.row_min, self.bbox_original.col_min)
    }

    /// Convert a frame-coordinate position (x, y) to stamp-local (x, y).
    pub fn to_cutout_position(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x - self.bbox_original.col_min as f64,
            y - self.bbox_original.row_min as f64,
        )
    }
}

/// Slice geometry of one source's stamp, stable across all frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StampGeometry {
    pub row_slice: Range<usize>,
    pub col_slice: Range<usize>,
    /// Color-adjusted midpoint, (x, y).
    pub mid_point: (i64, i64),
    pub cutout: CutoutGeometry,
}

impl StampGeometry {
    pub fn shape(&self) -> (usize, usize) {
        self.cutout.shape
    }
}

/// Round a positional spread up to a whole number of pad blocks.
pub fn pad_super_pixel(span: f64) -> usize {
    let blocks = (span.abs() / STAMP_PAD_MULTIPLE as f64).ceil() as usize;
    blocks * STAMP_PAD_MULTIPLE
}

/// Snap a raw midpoint onto the canonical color alignment.
///
/// The label of the rounded midpoint pixel decides a fixed offset landing it
/// on blue parity, so stamp boundaries always cut the color pattern the same
/// way; a further fixed shift (2 columns left, 4 rows down) centers the
/// stamp on the drift envelope. Every offset is parity-preserving.
pub fn adjust_midpoint(mid: (f64, f64)) -> (i64, i64) {
    let mut x = mid.0.round() as i64;
    let mut y = mid.1.round() as i64;

    match pixel_color(x, y) {
        PixelColor::R => {
            x += 1;
            y += 1;
        }
        PixelColor::G1 => y -= 1,
        PixelColor::G2 => x -= 1,
        PixelColor::B => {}
    }

    x -= 2;
    y += 4;

    (x, y)
}

/// Compute the stamp slice geometry for one source.
///
/// The bounding box is the absolute positional spread between the first and
/// last tracked positions (the drift envelope), padded to whole super-pixel
/// blocks, with the cutout centered on the color-adjusted midpoint of the
/// middle frame's position.
pub fn stamp_geometry(
    tracks: &Array3<f64>,
    source_index: usize,
    frame_dims: (usize, usize),
) -> Result<StampGeometry> {
    let (n_frames, n_sources, _) = tracks.dim();
    if source_index >= n_sources {
        return Err(ProcyonError::SourceIndexOutOfRange {
            index: source_index,
            total: n_sources,
        });
    }
    if n_frames == 0 {
        return Err(ProcyonError::EmptySequence);
    }

    let pos = |frame: usize| {
        (
            tracks[[frame, source_index, 0]],
            tracks[[frame, source_index, 1]],
        )
    };
    let start = pos(0);
    let mid = pos(n_frames / 2);
    let end = pos(n_frames - 1);

    // Drift envelope between the endpoints.
    let width = start.0 - end.0;
    let height = start.1 - end.1;

    let (mid_x, mid_y) = adjust_midpoint(mid);

    let n_rows = pad_super_pixel(height) + STAMP_EXTRA_ROWS;
    let n_cols = pad_super_pixel(width) + STAMP_EXTRA_COLS;

    let row_start = mid_y - (n_rows / 2) as i64;
    let col_start = mid_x - (n_cols / 2) as i64;

    let (frame_rows, frame_cols) = frame_dims;
    let in_bounds = row_start >= 0
        && col_start >= 0
        && row_start + n_rows as i64 <= frame_rows as i64
        && col_start + n_cols as i64 <= frame_cols as i64;
    if !in_bounds {
        return Err(ProcyonError::StampOutOfBounds { source_index });
    }

    let row_min = row_start as usize;
    let col_min = col_start as usize;

    Ok(StampGeometry {
        row_slice: row_min..row_min + n_rows,
        col_slice: col_min..col_min + n_cols,
        mid_point: (mid_x, mid_y),
        cutout: CutoutGeometry {
            bbox_original: BoundingBox {
                row_min,
                row_max: row_min + n_rows,
                col_min,
                col_max: col_min + n_cols,
            },
            bbox_cutout: BoundingBox {
                row_min: 0,
                row_max: n_rows,
                col_min: 0,
                col_max: n_cols,
            },
            shape: (n_rows, n_cols),
        },
    })
}

/// Cut one stamp out of a full frame slab.
pub fn extract_stamp(slab: &Array2<f32>, geometry: &StampGeometry) -> Array2<f32> {
    slab.slice(s![
        geometry.row_slice.clone(),
        geometry.col_slice.clone()
    ])
    .to_owned()
}
