use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use criteo_core::{run_all, PreprocConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Preprocess criteo dataset", long_about = None)]
struct Cli {
    /// Base path containing the criteo_parquet directory
    #[arg(long = "base_path", short = 'b')]
    base_path: PathBuf,

    /// TOML file overriding the workflow defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of parallel workers (defaults to available cores)
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PreprocConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PreprocConfig::from_env().context("failed to load config from environment")?,
    };
    if let Some(workers) = cli.workers {
        config.workers = Some(workers);
    }

    let summaries = run_all(&cli.base_path, &config)
        .await
        .with_context(|| format!("preprocessing {} failed", cli.base_path.display()))?;

    for summary in &summaries {
        info!(
            job = %summary.name,
            rows = summary.rows_out,
            files = summary.output_files,
            output = %summary.output_path.display(),
            "Job output ready"
        );
    }

    println!(
        "Processing took {:.2} sec",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
