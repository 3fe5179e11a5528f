use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3};
use tracing::{debug, info, warn};

use crate::background::{
    subtract_frame_models, subtract_stamp_background, SampleCache, TileGrid,
};
use crate::catalog::{self, PointSource};
use crate::color::{make_masks, ColorMasks};
use crate::config::ObservationConfig;
use crate::cube::FrameStore;
use crate::error::{ProcyonError, Result};
use crate::io::store::{DataStore, Dataset};
use crate::stamp::{extract_stamp, stamp_geometry, StampGeometry};
use crate::track::track_sources;
use crate::variance;

/// Scalar attrs recording the shared stamp shape.
pub const ATTR_STAMP_ROWS: &str = "stamp_rows";
pub const ATTR_STAMP_COLS: &str = "stamp_cols";

/// One image sequence processed as a unit.
///
/// The session object owns both persisted stores and every in-memory cache;
/// components receive it explicitly instead of reaching for global state.
/// Stage order is enforced by the orchestrator: catalog, tracks, cube,
/// frame-level background, stamps, variance. The `ensure_*` methods are
/// idempotent and state their preconditions.
#[derive(Debug)]
pub struct Observation {
    config: ObservationConfig,
    frames: FrameStore,
    cube_store: DataStore,
    subtracted_store: DataStore,
    background_grid: TileGrid,

    sources: Option<Vec<PointSource>>,
    tracks: Option<Array3<f64>>,
    stamp_cache: HashMap<usize, StampGeometry>,
    mask_cache: HashMap<(usize, usize), ColorMasks>,
    background_cache: SampleCache,
}

impl Observation {
    /// Open an observation directory. Fails with `DirectoryNotFound` if the
    /// path does not exist; the two backing stores are created beside it
    /// (`<dir>.store`, `<dir>_subtracted.store`).
    pub fn new(image_dir: &Path, config: ObservationConfig) -> Result<Self> {
        let frames = FrameStore::open(image_dir)?;
        let cube_store = DataStore::open(&store_path(image_dir, ".store"))?;
        let subtracted_store = DataStore::open(&store_path(image_dir, "_subtracted.store"))?;

        let background_grid = TileGrid::new(
            frames.dims(),
            (config.background_box_rows, config.background_box_cols),
        );

        info!(dir = %image_dir.display(), "observation session ready");
        Ok(Self {
            config,
            frames,
            cube_store,
            subtracted_store,
            background_grid,
            sources: None,
            tracks: None,
            stamp_cache: HashMap::new(),
            mask_cache: HashMap::new(),
            background_cache: SampleCache::new(),
        })
    }

    pub fn config(&self) -> &ObservationConfig {
        &self.config
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.frame_count()
    }

    /// The filtered source catalog. Precondition: `ensure_catalog` ran.
    pub fn sources(&self) -> Result<&[PointSource]> {
        self.sources
            .as_deref()
            .ok_or_else(|| ProcyonError::Catalog("catalog not loaded; run ensure_catalog".into()))
    }

    /// Tracked pixel positions. Precondition: `ensure_tracks` ran.
    pub fn tracks(&self) -> Result<&Array3<f64>> {
        self.tracks
            .as_ref()
            .ok_or_else(|| ProcyonError::Catalog("tracks not computed; run ensure_tracks".into()))
    }

    /// Load (or build, via the external detection tool) the source catalog.
    /// Idempotent unless `force_new`.
    pub fn ensure_catalog(&mut self, force_new: bool) -> Result<&[PointSource]> {
        if self.sources.is_none() || force_new {
            let frame_num = self.config.reference_frame;
            let reference = self.frames.file(frame_num)?.to_path_buf();
            let sources = catalog::lookup_point_sources(
                self.frames.image_dir(),
                &reference,
                frame_num,
                self.frames.dims(),
                self.config.edge_margin,
                &self.config.detection,
                force_new,
            )?;
            self.sources = Some(sources);
            // Positions moved; any cached geometry is stale.
            self.tracks = None;
            self.stamp_cache.clear();
        }
        Ok(self.sources.as_deref().expect("catalog just ensured"))
    }

    /// Compute pixel tracks for all frames and sources, eagerly. Obtains the
    /// catalog first if it is not loaded yet. Idempotent.
    pub fn ensure_tracks(&mut self) -> Result<&Array3<f64>> {
        if self.sources.is_none() {
            self.ensure_catalog(false)?;
        }
        if self.tracks.is_none() {
            let sources = self.sources.as_deref().expect("catalog ensured above");
            let tracks = track_sources(&self.frames, sources)?;
            self.tracks = Some(tracks);
        }
        Ok(self.tracks.as_ref().expect("tracks just ensured"))
    }

    /// The lazily-built bias-subtracted data cube.
    pub fn data_cube(&mut self) -> Result<Dataset> {
        self.frames
            .data_cube(&mut self.cube_store, self.config.camera_bias)
    }

    /// Frame-level background pass: fit and subtract the tiled per-channel
    /// background model of each listed frame (all frames when `None`),
    /// mutating the cube in place. Run once, before stamp creation.
    pub fn subtract_background(&mut self, frame_indices: Option<&[usize]>) -> Result<()> {
        let mut cube = self.data_cube()?;
        let dims = self.frames.dims();
        self.ensure_masks(dims);
        let masks = &self.mask_cache[&dims];

        let all: Vec<usize>;
        let indices = match frame_indices {
            Some(indices) => indices,
            None => {
                all = (0..self.frames.frame_count()).collect();
                &all
            }
        };

        let params = &self.config.background;
        for &frame_index in indices {
            debug!(frame_index, "fitting frame background");
            let mut slab = cube.read_frame(frame_index)?;
            subtract_frame_models(
                &mut slab,
                masks,
                &self.background_grid,
                params.sigma,
                params.max_iters,
            )?;
            cube.write_frame(frame_index, &slab.view())?;
        }
        cube.flush()?;
        info!(frames = indices.len(), "frame backgrounds subtracted");
        Ok(())
    }

    /// Slice geometry for one source, cached. `force_new` drops the cached
    /// entry first. Precondition: `ensure_tracks` ran.
    pub fn source_stamp(&mut self, source_index: usize, force_new: bool) -> Result<StampGeometry> {
        if force_new {
            self.stamp_cache.remove(&source_index);
        }
        if let Some(geometry) = self.stamp_cache.get(&source_index) {
            return Ok(geometry.clone());
        }
        let tracks = self
            .tracks
            .as_ref()
            .ok_or_else(|| ProcyonError::Catalog("tracks not computed; run ensure_tracks".into()))?;
        let geometry = stamp_geometry(tracks, source_index, self.frames.dims())?;
        self.stamp_cache.insert(source_index, geometry.clone());
        Ok(geometry)
    }

    /// Materialize the background-subtracted stamp cube of every source into
    /// the subtracted store (`subtracted/<index>`), and record the shared
    /// stamp shape attrs.
    ///
    /// Preconditions: `ensure_tracks` ran and the frame-level background
    /// pass is done. Sources whose dataset already exists are skipped, so
    /// interrupted runs resume. Per-source failures are logged and skipped;
    /// the batch continues. Returns the skipped indices.
    pub fn create_stamps(&mut self) -> Result<Vec<usize>> {
        let num_sources = self.sources()?.len();
        let mut skipped = Vec::new();
        let mut pending: Vec<(usize, StampGeometry)> = Vec::new();

        for source_index in 0..num_sources {
            let key = variance::subtracted_key(source_index);
            if self.subtracted_store.has_dataset(&key) {
                continue;
            }
            match self.source_stamp(source_index, false) {
                Ok(geometry) => pending.push((source_index, geometry)),
                Err(e) => {
                    warn!(source_index, error = %e, "problem creating stamp geometry");
                    skipped.push(source_index);
                }
            }
        }

        if pending.is_empty() {
            info!("no stamps to create");
            return Ok(skipped);
        }

        let cube = self.data_cube()?;
        let n_frames = self.frames.frame_count();

        // One dataset per source, then a single sweep over the cube filling
        // every stamp from each frame slab.
        let mut open: Vec<(usize, StampGeometry, Dataset)> = Vec::new();
        for (source_index, geometry) in pending {
            let (rows, cols) = geometry.shape();
            let key = variance::subtracted_key(source_index);
            match self
                .subtracted_store
                .create_dataset(&key, &[n_frames, rows, cols], 0.0)
            {
                Ok(dataset) => open.push((source_index, geometry, dataset)),
                Err(e) => {
                    warn!(source_index, error = %e, "problem creating subtracted stamp");
                    skipped.push(source_index);
                }
            }
        }

        for frame_index in 0..n_frames {
            let slab = cube.read_frame(frame_index)?;
            for (_, geometry, dataset) in open.iter_mut() {
                let stamp = extract_stamp(&slab, geometry);
                dataset.write_frame(frame_index, &stamp.view())?;
            }
        }

        let mut last_shape = None;
        for (source_index, geometry, dataset) in &open {
            dataset.flush()?;
            debug!(source_index, shape = ?geometry.shape(), "stamp cube stored");
            last_shape = Some(geometry.shape());
        }
        if let Some((rows, cols)) = last_shape {
            self.subtracted_store.set_attr(ATTR_STAMP_ROWS, rows as i64)?;
            self.subtracted_store.set_attr(ATTR_STAMP_COLS, cols as i64)?;
        }

        info!(
            created = open.len(),
            skipped = skipped.len(),
            "stamp creation finished"
        );
        Ok(skipped)
    }

    /// One source's stamp for one frame, background-subtracted.
    ///
    /// Served from the persisted subtracted cube when it exists; otherwise
    /// extracted on the fly from the data cube with stamp-level background
    /// subtraction (the expected cache-miss path, not an error).
    pub fn get_frame_stamp(&mut self, source_index: usize, frame_index: usize) -> Result<Array2<f32>> {
        let key = variance::subtracted_key(source_index);
        if self.subtracted_store.has_dataset(&key) {
            let dataset = self.subtracted_store.open_dataset(&key)?;
            return dataset.read_frame(frame_index);
        }

        debug!(source_index, frame_index, "stamp cache miss, extracting");
        let geometry = self.source_stamp(source_index, false)?;
        let cube = self.data_cube()?;
        let slab = cube.read_frame(frame_index)?;
        let stamp = extract_stamp(&slab, &geometry);

        let shape = stamp.dim();
        self.ensure_masks(shape);
        let masks = &self.mask_cache[&shape];
        let mid = (geometry.mid_point.0 as f64, geometry.mid_point.1 as f64);
        Ok(subtract_stamp_background(
            &stamp,
            frame_index,
            masks,
            mid,
            &self.background_grid,
            &mut self.background_cache,
            &self.config.background,
        ))
    }

    /// Fill the variance-grid row of one target source. Precondition:
    /// `create_stamps` ran. Returns the skipped comparison indices.
    pub fn compute_variance(&mut self, target_index: usize) -> Result<Vec<usize>> {
        let num_sources = self.sources()?.len();
        variance::compute_variance(&mut self.subtracted_store, target_index, num_sources)
    }

    /// Read the whole variance grid.
    pub fn variance_grid(&mut self) -> Result<Array2<f32>> {
        let num_sources = self.sources()?.len();
        variance::open_vgrid(&mut self.subtracted_store, num_sources)?.read_matrix()
    }

    /// Channel masks for a shape, built once per distinct shape.
    fn ensure_masks(&mut self, shape: (usize, usize)) {
        self.mask_cache
            .entry(shape)
            .or_insert_with(|| make_masks(shape));
    }

    /// Masks for a shape, for callers outside the session.
    pub fn masks_for(&mut self, shape: (usize, usize)) -> &ColorMasks {
        self.ensure_masks(shape);
        &self.mask_cache[&shape]
    }

    pub fn background_samples(&self) -> &SampleCache {
        &self.background_cache
    }

    pub fn subtracted_store(&self) -> &DataStore {
        &self.subtracted_store
    }
}

/// `/data/obs42` -> `/data/obs42.store` (or `_subtracted.store`).
fn store_path(image_dir: &Path, suffix: &str) -> PathBuf {
    let name = image_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "observation".into());
    image_dir.with_file_name(format!("{name}{suffix}"))
}
