use ndarray::Array2;
use procyon_core::error::ProcyonError;
use procyon_core::io::store::DataStore;

#[test]
fn frame_slabs_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DataStore::open(dir.path()).unwrap();

    let mut dataset = store.create_dataset("cube", &[3, 4, 5], 0.0).unwrap();
    let slab = Array2::from_shape_fn((4, 5), |(r, c)| (r * 5 + c) as f32);
    dataset.write_frame(1, &slab.view()).unwrap();

    let read = dataset.read_frame(1).unwrap();
    assert_eq!(read, slab);
    // Untouched slabs stay zero.
    assert!(dataset.read_frame(0).unwrap().iter().all(|&v| v == 0.0));

    let cube = dataset.read_cube().unwrap();
    assert_eq!(cube.dim(), (3, 4, 5));
    assert_eq!(cube[[1, 2, 3]], 13.0);
}

#[test]
fn datasets_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = DataStore::open(dir.path()).unwrap();
        let mut dataset = store.create_dataset("vgrid", &[2, 2], f32::NAN).unwrap();
        dataset.set(0, 1, 7.5).unwrap();
        dataset.flush().unwrap();
        store.set_attr("stamp_rows", 16).unwrap();
    }

    let store = DataStore::open(dir.path()).unwrap();
    assert_eq!(store.dataset_shape("vgrid"), Some(&[2usize, 2][..]));
    assert_eq!(store.attr("stamp_rows"), Some(16));

    let dataset = store.open_dataset("vgrid").unwrap();
    assert_eq!(dataset.get(0, 1).unwrap(), 7.5);
    assert!(dataset.get(0, 0).unwrap().is_nan());
    assert!(dataset.get(1, 1).unwrap().is_nan());
}

#[test]
fn nested_keys_map_to_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DataStore::open(dir.path()).unwrap();
    store.create_dataset("subtracted/12", &[2, 3, 3], 0.0).unwrap();

    assert!(dir.path().join("subtracted").join("12.dat").is_file());
    assert!(store.has_dataset("subtracted/12"));
    assert!(!store.has_dataset("subtracted/13"));
}

#[test]
fn missing_dataset_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = DataStore::open(dir.path()).unwrap();
    let err = store.open_dataset("cube").unwrap_err();
    assert!(matches!(err, ProcyonError::MissingDataset(_)));
}

#[test]
fn duplicate_create_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DataStore::open(dir.path()).unwrap();
    store.create_dataset("cube", &[1, 2, 2], 0.0).unwrap();
    assert!(store.create_dataset("cube", &[1, 2, 2], 0.0).is_err());
}
