use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;
use ndarray::{Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProcyonError, Result};

const META_FILE: &str = "meta.toml";
const BYTES_PER_ELEM: usize = std::mem::size_of::<f32>();

/// Shapes and scalar attributes for every dataset in a store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreMeta {
    #[serde(default)]
    datasets: BTreeMap<String, Vec<usize>>,
    #[serde(default)]
    attrs: BTreeMap<String, i64>,
}

/// Disk-backed collection of named f32 arrays.
///
/// Each dataset is a raw little-endian f32 file under the store directory
/// (`cube` -> `cube.dat`, `subtracted/7` -> `subtracted/7.dat`); `meta.toml`
/// records shapes and scalar attributes. Single-writer: one store handle
/// owns the directory for the lifetime of an observation session.
#[derive(Debug)]
pub struct DataStore {
    root: PathBuf,
    meta: StoreMeta,
}

impl DataStore {
    /// Open a store directory, creating it (and its metadata) if absent.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let meta_path = root.join(META_FILE);
        let meta = if meta_path.exists() {
            let text = fs::read_to_string(&meta_path)?;
            toml::from_str(&text).map_err(|e| ProcyonError::Store(e.to_string()))?
        } else {
            StoreMeta::default()
        };
        Ok(Self {
            root: root.to_path_buf(),
            meta,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_dataset(&self, key: &str) -> bool {
        self.meta.datasets.contains_key(key)
    }

    pub fn dataset_shape(&self, key: &str) -> Option<&[usize]> {
        self.meta.datasets.get(key).map(|s| s.as_slice())
    }

    pub fn dataset_keys(&self) -> impl Iterator<Item = &str> {
        self.meta.datasets.keys().map(|k| k.as_str())
    }

    /// Allocate a new dataset filled with `fill`.
    pub fn create_dataset(&mut self, key: &str, shape: &[usize], fill: f32) -> Result<Dataset> {
        let elems: usize = shape.iter().product();
        if elems == 0 {
            return Err(ProcyonError::Store(format!(
                "dataset {key} has empty shape {shape:?}"
            )));
        }
        if self.has_dataset(key) {
            return Err(ProcyonError::Store(format!("dataset {key} already exists")));
        }

        let path = self.dataset_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len((elems * BYTES_PER_ELEM) as u64)?;

        let mut dataset = Dataset::map(file, shape.to_vec())?;
        if fill != 0.0 {
            dataset.fill(fill);
        }

        debug!(key, ?shape, "created dataset");
        self.meta.datasets.insert(key.to_string(), shape.to_vec());
        self.save_meta()?;
        Ok(dataset)
    }

    /// Open an existing dataset for read/write access.
    pub fn open_dataset(&self, key: &str) -> Result<Dataset> {
        let shape = self
            .meta
            .datasets
            .get(key)
            .ok_or_else(|| ProcyonError::MissingDataset(key.to_string()))?
            .clone();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.dataset_path(key))?;
        Dataset::map(file, shape)
    }

    pub fn attr(&self, name: &str) -> Option<i64> {
        self.meta.attrs.get(name).copied()
    }

    pub fn set_attr(&mut self, name: &str, value: i64) -> Result<()> {
        self.meta.attrs.insert(name.to_string(), value);
        self.save_meta()
    }

    fn dataset_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/') {
            path.push(part);
        }
        path.set_extension("dat");
        path
    }

    fn save_meta(&self) -> Result<()> {
        let text =
            toml::to_string_pretty(&self.meta).map_err(|e| ProcyonError::Store(e.to_string()))?;
        fs::write(self.root.join(META_FILE), text)?;
        Ok(())
    }
}

/// Memory-mapped view of one dataset.
#[derive(Debug)]
pub struct Dataset {
    mmap: MmapMut,
    shape: Vec<usize>,
}

impl Dataset {
    fn map(file: File, shape: Vec<usize>) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * BYTES_PER_ELEM;
        let actual = file.metadata()?.len() as usize;
        if actual != expected {
            return Err(ProcyonError::Store(format!(
                "dataset file is {actual} bytes, shape {shape:?} needs {expected}"
            )));
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { mmap, shape })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fill(&mut self, value: f32) {
        let buf = vec![value; self.len()];
        LittleEndian::write_f32_into(&buf, &mut self.mmap[..]);
    }

    /// Read the whole dataset as a 3-D array. Errors unless the shape is 3-D.
    pub fn read_cube(&self) -> Result<Array3<f32>> {
        let [n, h, w] = self.dims3()?;
        let mut flat = vec![0.0f32; self.len()];
        LittleEndian::read_f32_into(&self.mmap[..], &mut flat);
        Array3::from_shape_vec((n, h, w), flat)
            .map_err(|e| ProcyonError::Store(e.to_string()))
    }

    /// Read one (rows x cols) slab of a 3-D dataset.
    pub fn read_frame(&self, index: usize) -> Result<Array2<f32>> {
        let [n, h, w] = self.dims3()?;
        if index >= n {
            return Err(ProcyonError::FrameIndexOutOfRange { index, total: n });
        }
        let elems = h * w;
        let start = index * elems * BYTES_PER_ELEM;
        let mut flat = vec![0.0f32; elems];
        LittleEndian::read_f32_into(&self.mmap[start..start + elems * BYTES_PER_ELEM], &mut flat);
        Array2::from_shape_vec((h, w), flat).map_err(|e| ProcyonError::Store(e.to_string()))
    }

    /// Overwrite one (rows x cols) slab of a 3-D dataset.
    pub fn write_frame(&mut self, index: usize, slab: &ArrayView2<f32>) -> Result<()> {
        let [n, h, w] = self.dims3()?;
        if index >= n {
            return Err(ProcyonError::FrameIndexOutOfRange { index, total: n });
        }
        if slab.dim() != (h, w) {
            return Err(ProcyonError::Store(format!(
                "slab shape {:?} does not match dataset rows/cols ({h}, {w})",
                slab.dim()
            )));
        }
        let flat: Vec<f32> = slab.iter().copied().collect();
        let start = index * h * w * BYTES_PER_ELEM;
        LittleEndian::write_f32_into(&flat, &mut self.mmap[start..start + flat.len() * BYTES_PER_ELEM]);
        Ok(())
    }

    /// Element read from a 2-D dataset.
    pub fn get(&self, row: usize, col: usize) -> Result<f32> {
        let [h, w] = self.dims2()?;
        self.check_2d(row, col, h, w)?;
        let offset = (row * w + col) * BYTES_PER_ELEM;
        Ok(LittleEndian::read_f32(&self.mmap[offset..offset + BYTES_PER_ELEM]))
    }

    /// Element write into a 2-D dataset.
    pub fn set(&mut self, row: usize, col: usize, value: f32) -> Result<()> {
        let [h, w] = self.dims2()?;
        self.check_2d(row, col, h, w)?;
        let offset = (row * w + col) * BYTES_PER_ELEM;
        LittleEndian::write_f32(&mut self.mmap[offset..offset + BYTES_PER_ELEM], value);
        Ok(())
    }

    /// Read the whole 2-D dataset.
    pub fn read_matrix(&self) -> Result<Array2<f32>> {
        let [h, w] = self.dims2()?;
        let mut flat = vec![0.0f32; self.len()];
        LittleEndian::read_f32_into(&self.mmap[..], &mut flat);
        Array2::from_shape_vec((h, w), flat).map_err(|e| ProcyonError::Store(e.to_string()))
    }

    /// Flush mapped pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    fn dims3(&self) -> Result<[usize; 3]> {
        match self.shape[..] {
            [n, h, w] => Ok([n, h, w]),
            _ => Err(ProcyonError::Store(format!(
                "expected 3-D dataset, shape is {:?}",
                self.shape
            ))),
        }
    }

    fn dims2(&self) -> Result<[usize; 2]> {
        match self.shape[..] {
            [h, w] => Ok([h, w]),
            _ => Err(ProcyonError::Store(format!(
                "expected 2-D dataset, shape is {:?}",
                self.shape
            ))),
        }
    }

    fn check_2d(&self, row: usize, col: usize, h: usize, w: usize) -> Result<()> {
        if row >= h || col >= w {
            return Err(ProcyonError::Store(format!(
                "index ({row}, {col}) out of bounds for shape ({h}, {w})"
            )));
        }
        Ok(())
    }
}
