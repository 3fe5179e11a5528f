mod common;

use procyon_core::config::ObservationConfig;
use procyon_core::observation::{Observation, ATTR_STAMP_COLS, ATTR_STAMP_ROWS};

use common::SyntheticObservation;

fn test_config() -> ObservationConfig {
    ObservationConfig {
        camera_bias: 100.0,
        edge_margin: 6.0,
        background_box_rows: 10,
        background_box_cols: 10,
        ..Default::default()
    }
}

fn reduced_observation(root: &std::path::Path) -> Observation {
    let dir = root.join("obs");
    let synthetic = SyntheticObservation::default();
    synthetic.write(&dir);

    let mut observation = Observation::new(&dir, test_config()).unwrap();
    observation.ensure_catalog(false).unwrap();
    observation.ensure_tracks().unwrap();
    observation.data_cube().unwrap();
    observation.subtract_background(None).unwrap();
    observation
}

#[test]
fn missing_directory_is_fatal() {
    let err = Observation::new(
        std::path::Path::new("/nonexistent/observation"),
        test_config(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        procyon_core::error::ProcyonError::DirectoryNotFound(_)
    ));
}

#[test]
fn catalog_loads_all_interior_sources() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("obs");
    SyntheticObservation::default().write(&dir);

    let mut observation = Observation::new(&dir, test_config()).unwrap();
    let sources = observation.ensure_catalog(false).unwrap();
    assert_eq!(sources.len(), 3);
}

#[test]
fn stamp_geometry_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("obs");
    let mut observation = {
        let synthetic = SyntheticObservation::default();
        synthetic.write(&dir);
        let mut observation = Observation::new(&dir, test_config()).unwrap();
        observation.ensure_tracks().unwrap();
        observation
    };

    let a = observation.source_stamp(0, false).unwrap();
    let b = observation.source_stamp(0, false).unwrap();
    assert_eq!(a, b);

    let forced = observation.source_stamp(0, true).unwrap();
    assert_eq!(a, forced);
}

#[test]
fn cache_miss_matches_stored_stamps() {
    let dir = tempfile::tempdir().unwrap();
    let mut observation = reduced_observation(dir.path());

    // No persisted stamp cubes yet: this goes through on-the-fly extraction.
    let on_the_fly = observation.get_frame_stamp(1, 2).unwrap();

    let skipped = observation.create_stamps().unwrap();
    assert!(skipped.is_empty(), "skipped {skipped:?}");

    let stored = observation.get_frame_stamp(1, 2).unwrap();
    assert_eq!(on_the_fly.dim(), stored.dim());
    for (a, b) in on_the_fly.iter().zip(stored.iter()) {
        assert!((a - b).abs() < 1e-3, "on-the-fly {a} vs stored {b}");
    }
}

#[test]
fn stamp_attrs_record_shared_shape() {
    let dir = tempfile::tempdir().unwrap();
    let mut observation = reduced_observation(dir.path());
    observation.create_stamps().unwrap();

    let geometry = observation.source_stamp(2, false).unwrap();
    let (rows, cols) = geometry.shape();
    let store = observation.subtracted_store();
    assert_eq!(store.attr(ATTR_STAMP_ROWS), Some(rows as i64));
    assert_eq!(store.attr(ATTR_STAMP_COLS), Some(cols as i64));
}

#[test]
fn create_stamps_resumes_without_rework() {
    let dir = tempfile::tempdir().unwrap();
    let mut observation = reduced_observation(dir.path());
    observation.create_stamps().unwrap();

    // All datasets exist: a second pass creates nothing and skips nothing.
    let skipped = observation.create_stamps().unwrap();
    assert!(skipped.is_empty());
}

#[test]
fn variance_grid_is_symmetric_with_zero_diagonal() {
    let dir = tempfile::tempdir().unwrap();
    let mut observation = reduced_observation(dir.path());
    observation.create_stamps().unwrap();

    let n = observation.sources().unwrap().len();
    for target in 0..n {
        let skipped = observation.compute_variance(target).unwrap();
        assert!(skipped.is_empty());
    }

    let grid = observation.variance_grid().unwrap();
    for i in 0..n {
        assert_eq!(grid[[i, i]], 0.0, "diagonal at {i}");
        for j in 0..n {
            assert!(grid[[i, j]].is_finite());
            assert_eq!(grid[[i, j]], grid[[j, i]], "symmetry at ({i}, {j})");
        }
    }

    // Distinct sources differ once normalized.
    assert!(grid[[0, 1]] > 0.0);
}
