use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use procyon_core::observation::Observation;

use super::load_config;

#[derive(Args)]
pub struct VarianceArgs {
    /// Observation directory of FITS frames
    pub dir: PathBuf,

    /// Observation config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fill the grid row of this source only (default: all sources)
    #[arg(long)]
    pub target: Option<usize>,

    /// How many best comparison stars to list per requested target
    #[arg(long, default_value = "10")]
    pub top: usize,
}

pub fn run(args: &VarianceArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut observation = Observation::new(&args.dir, config)?;
    let num_sources = observation.ensure_catalog(false)?.len();

    let targets: Vec<usize> = match args.target {
        Some(target) => vec![target],
        None => (0..num_sources).collect(),
    };

    let pb = ProgressBar::new(targets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Variance [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );

    let mut skipped_total = 0;
    for &target in &targets {
        skipped_total += observation.compute_variance(target)?.len();
        pb.inc(1);
    }
    pb.finish();

    if skipped_total > 0 {
        println!("Skipped {skipped_total} incompatible pairs (see warnings)");
    }

    if let Some(target) = args.target {
        print_ranking(&mut observation, target, args.top)?;
    }

    Ok(())
}

/// List the lowest-variance comparison sources for one target.
fn print_ranking(observation: &mut Observation, target: usize, top: usize) -> Result<()> {
    let grid = observation.variance_grid()?;
    let mut ranked: Vec<(usize, f32)> = grid
        .row(target)
        .iter()
        .enumerate()
        .filter(|(index, v)| *index != target && v.is_finite())
        .map(|(index, &v)| (index, v))
        .collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("finite variances"));

    let header = Style::new().cyan().bold();
    println!();
    println!("{}", header.apply_to(format!("Best comparisons for source {target}")));
    for (index, v) in ranked.iter().take(top) {
        println!("  [{index:>4}]  v = {v:.6e}");
    }
    Ok(())
}
