use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ProcyonError, Result};
use crate::frame::Frame;
use crate::io::fits;
use crate::io::store::{DataStore, Dataset};

/// Key of the full bias-subtracted cube in the primary store.
pub const CUBE_KEY: &str = "cube";

/// The ordered frame sequence of one observation.
///
/// Frames are FITS files in a single directory, ordered lexicographically.
/// The store holds the backing storage for the lazily-built data cube; this
/// type owns the file list and the cube's lifecycle.
#[derive(Debug)]
pub struct FrameStore {
    image_dir: PathBuf,
    files: Vec<PathBuf>,
    /// (height, width) from the first frame's header.
    dims: (usize, usize),
}

impl FrameStore {
    /// Scan `image_dir` for frames. Fails if the directory does not exist or
    /// holds no FITS files.
    pub fn open(image_dir: &Path) -> Result<Self> {
        if !image_dir.is_dir() {
            return Err(ProcyonError::DirectoryNotFound(image_dir.to_path_buf()));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(image_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("fits"))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(ProcyonError::EmptySequence);
        }

        let header = fits::read_header(&files[0])?;
        let width = header
            .get_i64("NAXIS1")
            .ok_or_else(|| ProcyonError::InvalidFits("missing NAXIS1".into()))?
            as usize;
        let height = header
            .get_i64("NAXIS2")
            .ok_or_else(|| ProcyonError::InvalidFits("missing NAXIS2".into()))?
            as usize;

        info!(
            dir = %image_dir.display(),
            frames = files.len(),
            height,
            width,
            "opened frame sequence"
        );

        Ok(Self {
            image_dir: image_dir.to_path_buf(),
            files,
            dims: (height, width),
        })
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    /// (height, width) of every frame.
    pub fn dims(&self) -> (usize, usize) {
        self.dims
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn file(&self, index: usize) -> Result<&Path> {
        self.files
            .get(index)
            .map(|p| p.as_path())
            .ok_or(ProcyonError::FrameIndexOutOfRange {
                index,
                total: self.files.len(),
            })
    }

    /// Load one raw frame (bias still included).
    pub fn frame(&self, index: usize) -> Result<Frame> {
        let path = self.file(index)?;
        let (data, _) = fits::read_image(path)?;
        if data.dim() != self.dims {
            return Err(ProcyonError::InvalidDimensions {
                width: data.ncols(),
                height: data.nrows(),
            });
        }
        Ok(Frame::new(data, index, path.to_path_buf()))
    }

    /// The lazily-materialized data cube (frame x row x col).
    ///
    /// On first call this allocates the `"cube"` dataset and fills it frame
    /// by frame with `camera_bias` subtracted; afterwards it opens the
    /// existing dataset without touching the frame files again.
    pub fn data_cube(&self, store: &mut DataStore, camera_bias: f32) -> Result<Dataset> {
        if store.has_dataset(CUBE_KEY) {
            return store.open_dataset(CUBE_KEY);
        }

        debug!("creating data cube");
        let (height, width) = self.dims;
        let mut cube =
            store.create_dataset(CUBE_KEY, &[self.frame_count(), height, width], 0.0)?;

        for index in 0..self.frame_count() {
            let mut frame = self.frame(index)?;
            frame.data -= camera_bias;
            cube.write_frame(index, &frame.data.view())?;
        }
        cube.flush()?;
        info!(frames = self.frame_count(), "data cube materialized");
        Ok(cube)
    }
}
