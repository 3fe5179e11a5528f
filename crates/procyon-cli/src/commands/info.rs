use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use procyon_core::cube::{FrameStore, CUBE_KEY};
use procyon_core::io::store::DataStore;
use procyon_core::variance::VGRID_KEY;

#[derive(Args)]
pub struct InfoArgs {
    /// Observation directory of FITS frames
    pub dir: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let frames = FrameStore::open(&args.dir)?;
    let (height, width) = frames.dims();

    println!("Directory:   {}", args.dir.display());
    println!("Frames:      {}", frames.frame_count());
    println!("Dimensions:  {}x{}", width, height);

    let frame_mb = (height * width * 4) as f64 / (1024.0 * 1024.0);
    println!(
        "Cube size:   {:.1} MB",
        frame_mb * frames.frame_count() as f64
    );

    let cube_store = DataStore::open(&store_dir(&args.dir, ".store"))?;
    println!(
        "Cube:        {}",
        if cube_store.has_dataset(CUBE_KEY) {
            "materialized"
        } else {
            "not built"
        }
    );

    let subtracted = DataStore::open(&store_dir(&args.dir, "_subtracted.store"))?;
    let stamp_count = subtracted
        .dataset_keys()
        .filter(|k| k.starts_with("subtracted/"))
        .count();
    println!("Stamps:      {stamp_count}");
    println!(
        "Vgrid:       {}",
        if subtracted.has_dataset(VGRID_KEY) {
            "present"
        } else {
            "not built"
        }
    );

    Ok(())
}

fn store_dir(dir: &std::path::Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "observation".into());
    dir.with_file_name(format!("{name}{suffix}"))
}
