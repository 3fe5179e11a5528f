use std::path::PathBuf;

use ndarray::Array2;

/// A single raw camera frame.
/// Pixel values are f32 in linear ADU, bias still included.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Position of this frame in the observation sequence
    pub index: usize,
    /// File the frame was read from
    pub path: PathBuf,
}

impl Frame {
    pub fn new(data: Array2<f32>, index: usize, path: PathBuf) -> Self {
        Self { data, index, path }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}
