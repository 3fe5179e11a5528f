use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcyonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("External tool not found: {0}")]
    ExternalToolMissing(String),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Source index {index} out of range (total: {total})")]
    SourceIndexOutOfRange { index: usize, total: usize },

    #[error("Stamp shape mismatch: expected {expected:?}, got {actual:?}")]
    StampShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Stamp for source {source_index} extends past image bounds")]
    StampOutOfBounds { source_index: usize },

    #[error("Missing WCS keyword: {0}")]
    MissingWcs(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Dataset not found in store: {0}")]
    MissingDataset(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty frame sequence")]
    EmptySequence,
}

pub type Result<T> = std::result::Result<T, ProcyonError>;
