use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use procyon_core::observation::Observation;

use super::load_config;

#[derive(Args)]
pub struct CatalogArgs {
    /// Observation directory of FITS frames
    pub dir: PathBuf,

    /// Observation config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Rebuild the catalog even if one exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: &CatalogArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut observation = Observation::new(&args.dir, config)?;

    let sources = observation.ensure_catalog(args.force)?;
    println!("Catalog: {} usable point sources", sources.len());
    for source in sources.iter().take(10) {
        println!(
            "  [{:>4}] ra {:>10.5}  dec {:>10.5}  x {:>8.2}  y {:>8.2}",
            source.index, source.ra, source.dec, source.x, source.y
        );
    }
    if sources.len() > 10 {
        println!("  ... and {} more", sources.len() - 10);
    }

    Ok(())
}
