use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use procyon_core::observation::Observation;

use super::load_config;

#[derive(Args)]
pub struct ReduceArgs {
    /// Observation directory of FITS frames
    pub dir: PathBuf,

    /// Observation config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip the frame-level background pass
    #[arg(long)]
    pub no_background: bool,
}

pub fn run(args: &ReduceArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut observation = Observation::new(&args.dir, config)?;

    let sources = observation.ensure_catalog(false)?.len();
    println!("Catalog: {sources} point sources");

    observation.ensure_tracks()?;
    println!("Tracked positions across {} frames", observation.frame_count());

    println!("Building data cube...");
    observation.data_cube()?;

    if !args.no_background {
        let total = observation.frame_count();
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("Background [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        for frame_index in 0..total {
            observation.subtract_background(Some(&[frame_index]))?;
            pb.set_position(frame_index as u64 + 1);
        }
        pb.finish();
    }

    println!("Storing stamp cubes...");
    let skipped = observation.create_stamps()?;
    if skipped.is_empty() {
        println!("All stamp cubes stored");
    } else {
        println!("Skipped {} sources: {:?}", skipped.len(), skipped);
    }

    Ok(())
}
