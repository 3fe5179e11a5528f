use ndarray::Array3;
use procyon_core::io::store::DataStore;
use procyon_core::variance::{compute_variance, open_vgrid, subtracted_key, VGRID_KEY};

fn store_with_cubes(dir: &std::path::Path, cubes: &[Array3<f32>]) -> DataStore {
    let mut store = DataStore::open(dir).unwrap();
    for (index, cube) in cubes.iter().enumerate() {
        let (n, h, w) = cube.dim();
        let mut dataset = store
            .create_dataset(&subtracted_key(index), &[n, h, w], 0.0)
            .unwrap();
        for frame in 0..n {
            dataset
                .write_frame(frame, &cube.index_axis(ndarray::Axis(0), frame))
                .unwrap();
        }
    }
    store
}

fn peaked_cube(peak_row: usize) -> Array3<f32> {
    let mut cube = Array3::<f32>::zeros((2, 4, 4));
    for frame in 0..2 {
        cube[[frame, peak_row, 1]] = 10.0;
    }
    cube
}

#[test]
fn grid_is_symmetric_and_nan_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_with_cubes(dir.path(), &[peaked_cube(0), peaked_cube(2), peaked_cube(3)]);

    let skipped = compute_variance(&mut store, 0, 3).unwrap();
    assert!(skipped.is_empty());

    let grid = store.open_dataset(VGRID_KEY).unwrap();
    assert_eq!(grid.get(0, 0).unwrap(), 0.0);
    assert!(grid.get(0, 1).unwrap() > 0.0);
    assert_eq!(grid.get(0, 1).unwrap(), grid.get(1, 0).unwrap());
    assert_eq!(grid.get(0, 2).unwrap(), grid.get(2, 0).unwrap());
    // Pairs not involving the target stay unset.
    assert!(grid.get(1, 2).unwrap().is_nan());
}

#[test]
fn identical_cubes_yield_exact_zero_without_recompute_ambiguity() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_with_cubes(dir.path(), &[peaked_cube(1), peaked_cube(1)]);

    compute_variance(&mut store, 0, 2).unwrap();
    let grid = store.open_dataset(VGRID_KEY).unwrap();
    // A real zero is stored as zero, not left as the NaN sentinel.
    assert_eq!(grid.get(0, 1).unwrap(), 0.0);
    assert!(!grid.get(0, 1).unwrap().is_nan());
}

#[test]
fn second_pass_leaves_computed_cells_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_with_cubes(dir.path(), &[peaked_cube(0), peaked_cube(2)]);

    compute_variance(&mut store, 0, 2).unwrap();

    // Poke a sentinel value into a computed cell; the resumed pass must not
    // overwrite it.
    {
        let mut grid = store.open_dataset(VGRID_KEY).unwrap();
        grid.set(0, 1, 99.0).unwrap();
        grid.set(1, 0, 99.0).unwrap();
        grid.flush().unwrap();
    }

    compute_variance(&mut store, 0, 2).unwrap();
    let grid = store.open_dataset(VGRID_KEY).unwrap();
    assert_eq!(grid.get(0, 1).unwrap(), 99.0);
}

#[test]
fn incompatible_shapes_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_with_cubes(dir.path(), &[peaked_cube(0), peaked_cube(2)]);
    // A third source whose stamps came out a different size.
    store
        .create_dataset(&subtracted_key(2), &[2, 6, 6], 1.0)
        .unwrap();

    let skipped = compute_variance(&mut store, 0, 3).unwrap();
    assert_eq!(skipped, vec![2]);

    let grid = store.open_dataset(VGRID_KEY).unwrap();
    assert!(grid.get(0, 2).unwrap().is_nan());
    assert!(grid.get(0, 1).unwrap() >= 0.0);
}

#[test]
fn missing_cube_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_with_cubes(dir.path(), &[peaked_cube(0)]);

    let skipped = compute_variance(&mut store, 0, 2).unwrap();
    assert_eq!(skipped, vec![1]);

    let grid = open_vgrid(&mut store, 2).unwrap();
    assert!(grid.get(0, 1).unwrap().is_nan());
    assert_eq!(grid.get(0, 0).unwrap(), 0.0);
}
