use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use procyon_core::io::fits::{write_image, FitsHeader};
use procyon_core::wcs::TanWcs;

/// Plate scale of the synthetic solutions: 1 arcsec per pixel.
pub const SCALE_DEG: f64 = 1.0 / 3600.0;

/// TAN solution for one synthetic frame.
///
/// Field drift is modeled by shifting the reference pixel: a fixed sky
/// position moves by `drift` pixels per frame.
pub fn frame_wcs(frame: usize, drift: (f64, f64)) -> TanWcs {
    let crpix = (
        10.0 + frame as f64 * drift.0,
        10.0 + frame as f64 * drift.1,
    );
    TanWcs::new(
        (180.0, 0.0),
        crpix,
        [[-SCALE_DEG, 0.0], [0.0, SCALE_DEG]],
    )
    .expect("synthetic WCS is well formed")
}

/// Flat sky plus a 2x2 block of `flux` at each source position.
pub fn render_frame(
    dims: (usize, usize),
    sky_level: f32,
    sources_px: &[(f64, f64)],
    flux: f32,
) -> Array2<f32> {
    let (rows, cols) = dims;
    let mut data = Array2::from_elem(dims, sky_level);
    for &(x, y) in sources_px {
        let col = x.round() as i64;
        let row = y.round() as i64;
        for dr in 0..2i64 {
            for dc in 0..2i64 {
                let r = row + dr;
                let c = col + dc;
                if r >= 0 && r < rows as i64 && c >= 0 && c < cols as i64 {
                    data[[r as usize, c as usize]] += flux;
                }
            }
        }
    }
    data
}

/// Settings of one synthetic observation directory.
pub struct SyntheticObservation {
    pub n_frames: usize,
    pub dims: (usize, usize),
    /// Pixel drift per frame, (dx, dy).
    pub drift: (f64, f64),
    pub sky_level: f32,
    pub camera_bias: f32,
    pub source_flux: f32,
    /// Frame-0 pixel positions of the sources.
    pub sources_px: Vec<(f64, f64)>,
}

impl Default for SyntheticObservation {
    fn default() -> Self {
        Self {
            n_frames: 3,
            dims: (40, 40),
            drift: (1.0, 0.0),
            sky_level: 20.0,
            camera_bias: 100.0,
            source_flux: 500.0,
            // Mixed Bayer parities, so stamps land at distinct offsets.
            sources_px: vec![(12.0, 12.0), (27.0, 14.0), (14.0, 29.0)],
        }
    }
}

impl SyntheticObservation {
    /// Sky coordinates of the sources under the frame-0 solution.
    pub fn sources_sky(&self) -> Vec<(f64, f64)> {
        let wcs = frame_wcs(0, self.drift);
        self.sources_px
            .iter()
            .map(|&(x, y)| wcs.pixel_to_world(x, y))
            .collect()
    }

    /// Write the FITS frames (bias included) and the catalog file into `dir`.
    pub fn write(&self, dir: &Path) -> PathBuf {
        fs::create_dir_all(dir).expect("create observation dir");

        let sky = self.sources_sky();
        for frame in 0..self.n_frames {
            let wcs = frame_wcs(frame, self.drift);
            let positions: Vec<(f64, f64)> = sky
                .iter()
                .map(|&(ra, dec)| wcs.world_to_pixel(ra, dec))
                .collect();
            let mut data = render_frame(self.dims, self.sky_level, &positions, self.source_flux);
            data += self.camera_bias;

            let mut header = FitsHeader::new();
            wcs.write_to(&mut header);
            let path = dir.join(format!("frame_{frame:03}.fits"));
            write_image(&path, &data, &header).expect("write synthetic frame");
        }

        self.write_catalog(dir, 0);
        dir.to_path_buf()
    }

    /// Catalog file in the detection tool's ASCII-head format, all rows
    /// unflagged.
    pub fn write_catalog(&self, dir: &Path, frame_num: usize) {
        let sky = self.sources_sky();
        let mut text = String::from(
            "#   1 X_IMAGE         Object position along x         [pixel]\n\
             #   2 Y_IMAGE         Object position along y         [pixel]\n\
             #   3 ALPHA_J2000     Right ascension of barycenter   [deg]\n\
             #   4 DELTA_J2000     Declination of barycenter       [deg]\n\
             #   5 FLAGS           Extraction flags\n",
        );
        for (&(x, y), &(ra, dec)) in self.sources_px.iter().zip(sky.iter()) {
            // Catalog positions are FITS 1-based.
            text.push_str(&format!(
                "{:10.3} {:10.3} {:12.7} {:12.7}   0\n",
                x + 1.0,
                y + 1.0,
                ra,
                dec
            ));
        }
        fs::write(
            dir.join(format!("point_sources_{frame_num:02}.cat")),
            text,
        )
        .expect("write catalog");
    }
}
