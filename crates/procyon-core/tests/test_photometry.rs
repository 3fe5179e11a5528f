mod common;

use procyon_core::config::ObservationConfig;
use procyon_core::observation::Observation;
use procyon_core::photometry::source_fluxes;

use common::SyntheticObservation;

/// The tracked aperture captures the whole synthetic blob in every frame,
/// so the light curve is flat at 4 pixels x source flux.
#[test]
fn tracked_aperture_recovers_constant_flux() {
    let synthetic = SyntheticObservation::default();
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("obs");
    synthetic.write(&dir);

    let config = ObservationConfig {
        camera_bias: 100.0,
        edge_margin: 6.0,
        background_box_rows: 10,
        background_box_cols: 10,
        ..Default::default()
    };
    let mut observation = Observation::new(&dir, config).unwrap();
    observation.ensure_tracks().unwrap();
    observation.subtract_background(None).unwrap();
    observation.create_stamps().unwrap();

    let expected = 4.0 * synthetic.source_flux as f64;
    let fluxes = source_fluxes(&mut observation, 0).unwrap();
    assert_eq!(fluxes.len(), synthetic.n_frames);
    for (frame, &flux) in fluxes.iter().enumerate() {
        assert!(
            (flux - expected).abs() < 5.0,
            "frame {frame}: flux {flux}, expected ~{expected}"
        );
    }
}
