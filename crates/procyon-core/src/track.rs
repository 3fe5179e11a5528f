use ndarray::Array3;
use tracing::info;

use crate::catalog::PointSource;
use crate::cube::FrameStore;
use crate::error::Result;
use crate::io::fits;
use crate::wcs::TanWcs;

/// Per-frame pixel positions of every catalog source.
///
/// Shape (frame, source, 2) with x at axis-2 index 0 and y at index 1;
/// computed once, eagerly, because stamp geometry needs the start, middle
/// and end positions of every source. Read-only after construction.
pub fn track_sources(store: &FrameStore, sources: &[PointSource]) -> Result<Array3<f64>> {
    let mut tracks = Array3::<f64>::zeros((store.frame_count(), sources.len(), 2));

    for (frame_index, file) in store.files().iter().enumerate() {
        let header = fits::read_header(file)?;
        let wcs = TanWcs::from_header(&header)?;
        for source in sources {
            let (x, y) = wcs.world_to_pixel(source.ra, source.dec);
            tracks[[frame_index, source.index, 0]] = x;
            tracks[[frame_index, source.index, 1]] = y;
        }
    }

    info!(
        frames = store.frame_count(),
        sources = sources.len(),
        "tracked pixel positions"
    );
    Ok(tracks)
}
