mod config;
mod data;
mod dataset;
mod error;
mod metrics;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use ndarray::ArrayD;
use serde::de::DeserializeOwned;

use config::Settings;
use data::{loader, tensor, writer};
use dataset::normalize::MinMaxNormalizer;
use dataset::split::build_dataset;

#[derive(Parser)]
#[command(name = "crime-grid", version)]
#[command(
    about = "Build spatio-temporal crime-count grids and training datasets",
    long_about = None
)]
struct Cli {
    /// JSON settings file; built-in defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn raw incident rows into a per-slot grid tensor
    Prepare {
        /// Incident file (.csv or .parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Grid output (.parquet or .json)
        #[arg(short, long, default_value = "crime_grid.parquet")]
        output: PathBuf,
    },

    /// Build normalized closeness/period/trend samples and split train/test
    Dataset {
        /// Grid written by `prepare`
        #[arg(short, long)]
        grid: PathBuf,

        /// Directory receiving the split arrays
        #[arg(short, long, default_value = "dataset")]
        out_dir: PathBuf,
    },

    /// Score predictions against targets
    Evaluate {
        /// Predictions as an ndarray JSON file
        #[arg(short, long)]
        predictions: PathBuf,

        /// Targets as an ndarray JSON file
        #[arg(short, long)]
        targets: PathBuf,

        /// Normalizer JSON; when given both arrays are mapped back to counts
        #[arg(short, long)]
        normalizer: Option<PathBuf>,
    },

    /// Print a short description of a grid file
    Inspect {
        #[arg(value_name = "GRID")]
        grid: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Prepare { input, output } => prepare(&settings, &input, &output),
        Commands::Dataset { grid, out_dir } => build_split(&settings, &grid, &out_dir),
        Commands::Evaluate {
            predictions,
            targets,
            normalizer,
        } => evaluate(&settings, &predictions, &targets, normalizer.as_deref()),
        Commands::Inspect { grid } => inspect(&grid),
    }
}

fn prepare(settings: &Settings, input: &Path, output: &Path) -> Result<()> {
    let records = loader::load_incidents(input, &settings.pipeline.columns)?;
    let grid = tensor::build_grid(records, &settings.pipeline)?;
    writer::write_grid(&grid, output)?;
    println!(
        "{} slots, shape {:?}, {} incidents → {}",
        grid.len(),
        grid.data().shape(),
        grid.total_incidents(),
        output.display()
    );
    Ok(())
}

fn build_split(settings: &Settings, grid_path: &Path, out_dir: &Path) -> Result<()> {
    let grid = writer::read_grid(grid_path)?;
    let split = build_dataset(&grid, settings)?;
    split.write_to(out_dir)?;
    println!("{}", split.summary());
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

fn evaluate(
    settings: &Settings,
    predictions: &Path,
    targets: &Path,
    normalizer: Option<&Path>,
) -> Result<()> {
    let mut pred: ArrayD<f64> = read_json(predictions)?;
    let mut target: ArrayD<f64> = read_json(targets)?;

    if let Some(path) = normalizer {
        let mmn: MinMaxNormalizer = read_json(path)?;
        info!("inverse-transforming with min={} max={}", mmn.min, mmn.max);
        pred = mmn.inverse_transform(pred.view());
        target = mmn.inverse_transform(target.view());
    }

    let factor = metrics::m_factor(
        settings.pipeline.grid_height,
        settings.pipeline.grid_width,
        settings.dataset.nb_area,
    );
    let score = metrics::evaluate(pred.view(), target.view(), factor)?;
    println!("Score:\n{score}");
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let grid = writer::read_grid(path)?;
    println!("frames:    {}", grid.len());
    println!("shape:     {:?}", grid.data().shape());
    if let (Some(first), Some(last)) = (grid.timestamps().first(), grid.timestamps().last()) {
        println!("range:     {first} .. {last}");
    }
    println!("incidents: {}", grid.total_incidents());
    let busiest = (0..grid.len()).max_by_key(|&i| grid.histogram(i).sum());
    if let Some(i) = busiest {
        println!(
            "busiest:   {} ({} incidents)",
            grid.timestamps()[i],
            grid.histogram(i).sum()
        );
    }
    Ok(())
}
