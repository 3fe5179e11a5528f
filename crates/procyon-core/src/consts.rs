/// Built-in camera bias (ADU), subtracted when frames enter the data cube.
pub const DEFAULT_CAMERA_BIAS: f32 = 1024.0;

/// Sources closer than this (in pixels) to any frame edge are dropped at
/// catalog load so stamp extraction can never run off-frame.
pub const DEFAULT_EDGE_MARGIN: f64 = 60.0;

/// Default background-box height (rows). Chosen to divide the reference
/// sensor (3476 rows) into 11 tiles while staying a super-pixel multiple.
pub const DEFAULT_BACKGROUND_BOX_ROWS: usize = 316;

/// Default background-box width (cols). 12 tiles across 5208 columns.
pub const DEFAULT_BACKGROUND_BOX_COLS: usize = 434;

/// Maximum number of clipped-statistics samples cached per
/// (frame, background cell, channel) key. Once full, subtraction reuses the
/// running median instead of recomputing.
pub const BACKGROUND_SAMPLE_CAP: usize = 5;

/// Sigma threshold for clipped background statistics.
pub const DEFAULT_CLIP_SIGMA: f64 = 3.0;

/// Maximum sigma-clipping iterations.
pub const DEFAULT_CLIP_ITERS: usize = 10;

/// Signal-to-noise threshold used to flag source pixels when building the
/// background exclusion mask.
pub const DEFAULT_SOURCE_MASK_SNR: f64 = 3.0;

/// Side of one repeating color-filter unit (2x2 regular pixels).
pub const SUPER_PIXEL: usize = 2;

/// Stamp width and height are padded up to the next multiple of this.
pub const STAMP_PAD_MULTIPLE: usize = 8;

/// Extra rows added to the padded stamp height.
pub const STAMP_EXTRA_ROWS: usize = 8;

/// Extra columns added to the padded stamp width.
pub const STAMP_EXTRA_COLS: usize = 4;

/// Default photometry aperture side (pixels); 3 super-pixels.
pub const DEFAULT_APERTURE_SIZE: usize = 6;

/// Minimum in-mask pixels for a background tile statistic to be trusted.
pub const MIN_TILE_SAMPLES: usize = 4;
