use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use plotstats::{run_products, ImageCatalog, RunConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "plotstats")]
#[command(about = "Zonal statistics of site plots over raster time series")]
#[command(version)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run zonal statistics for the products of a config file
    Run {
        /// TOML run configuration
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Override the zone vector file
        #[arg(long, value_name = "FILE")]
        zones: Option<PathBuf>,

        /// Override the output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Number of extraction workers (default: all available)
        #[arg(short, long, value_name = "N")]
        workers: Option<usize>,

        /// Run only this product (repeatable)
        #[arg(short, long = "product", value_name = "NAME")]
        products: Vec<String>,
    },
    /// Write an image list for files in a directory matching a pattern
    Catalog {
        /// Directory to search
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Glob pattern relative to DIR, e.g. "*dbia2.tif"
        #[arg(value_name = "PATTERN")]
        pattern: String,

        /// Image list to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Run {
            config,
            zones,
            output,
            workers,
            products,
        } => run(config, zones, output, workers, &products),
        Command::Catalog {
            dir,
            pattern,
            output,
        } => {
            let catalog = ImageCatalog::discover(&dir, &pattern)
                .with_context(|| format!("cannot search {}", dir.display()))?;
            catalog.write_list(&output)?;
            info!("Wrote {} images to {}", catalog.len(), output.display());
            Ok(())
        }
    }
}

fn run(
    config_path: PathBuf,
    zones: Option<PathBuf>,
    output: Option<PathBuf>,
    workers: Option<usize>,
    products: &[String],
) -> Result<()> {
    let mut config = RunConfig::from_file(&config_path)
        .with_context(|| format!("cannot load {}", config_path.display()))?;
    if let Some(zones) = zones {
        config.zones = zones;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
    if workers.is_some() {
        config.workers = workers;
    }
    config.validate()?;

    info!("=== plotstats ===");
    info!("Zones: {}", config.zones.display());
    info!("Output: {}", config.output_dir.display());

    let results = run_products(&config, products)?;
    let mut failed = Vec::new();
    for (name, result) in &results {
        match result {
            Ok(report) => info!(
                "{}: {} images, {} rows, {} site files",
                name,
                report.images,
                report.rows,
                report.files.len()
            ),
            Err(e) => {
                error!("{}: {}", name, e);
                failed.push(name.as_str());
            }
        }
    }

    if !failed.is_empty() {
        bail!(
            "{} of {} products failed: {}",
            failed.len(),
            results.len(),
            failed.join(", ")
        );
    }
    info!("=== Done! ===");
    Ok(())
}
