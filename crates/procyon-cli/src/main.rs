mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "procyon", about = "Differential photometry pipeline for wide-field frame sequences")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show observation directory and store status
    Info(commands::info::InfoArgs),
    /// Build or refresh the point-source catalog
    Catalog(commands::catalog::CatalogArgs),
    /// Print or save a default observation config
    Config(commands::config::ConfigArgs),
    /// Build the cube, subtract backgrounds and store stamp cubes
    Reduce(commands::reduce::ReduceArgs),
    /// Fill the pairwise variance grid and rank comparison stars
    Variance(commands::variance::VarianceArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Catalog(args) => commands::catalog::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Reduce(args) => commands::reduce::run(args),
        Commands::Variance(args) => commands::variance::run(args),
    }
}
