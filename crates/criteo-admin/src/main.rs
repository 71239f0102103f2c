use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use criteo_core::writer::read_metadata;
use criteo_parser::{convert_tsv_file, split_day, DEFAULT_BATCH_ROWS};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Criteo dataset administrative tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert raw tab-separated day files into Parquet
    ConvertTsv(ConvertTsvArgs),
    /// Split the last day into validation and test halves
    SplitDay(SplitDayArgs),
    /// Print the shard table of a preprocessed output directory
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct ConvertTsvArgs {
    /// Glob matching the raw day files, e.g. "raw/day_*"
    #[arg(long)]
    input: String,
    /// Directory receiving <name>.parquet files
    #[arg(long)]
    output_dir: PathBuf,
    /// Rows buffered per Parquet row group
    #[arg(long, default_value_t = DEFAULT_BATCH_ROWS)]
    batch_rows: usize,
}

#[derive(Args, Debug)]
struct SplitDayArgs {
    /// Parquet file of the last day
    #[arg(long)]
    input: PathBuf,
    /// Directory receiving the part0/part1 files
    #[arg(long)]
    output_dir: PathBuf,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Output directory containing _metadata.json
    #[arg(long)]
    path: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::ConvertTsv(args) => handle_convert(args),
        Command::SplitDay(args) => handle_split(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_convert(args: ConvertTsvArgs) -> Result<()> {
    let inputs: Vec<PathBuf> = glob::glob(&args.input)
        .with_context(|| format!("invalid glob pattern '{}'", args.input))?
        .collect::<std::result::Result<_, _>>()
        .context("failed to read glob match")?;
    let inputs: Vec<PathBuf> = inputs.into_iter().filter(|path| path.is_file()).collect();
    if inputs.is_empty() {
        bail!("no files matched '{}'", args.input);
    }

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    let mut total_rows = 0;
    for input in &inputs {
        let output = args.output_dir.join(parquet_name(input)?);
        let report = convert_tsv_file(input, &output, args.batch_rows)
            .with_context(|| format!("failed to convert {}", input.display()))?;
        println!("{} -> {} ({} rows)", input.display(), output.display(), report.rows);
        total_rows += report.rows;
    }

    info!(files = inputs.len(), total_rows, "Conversion finished");
    Ok(())
}

fn parquet_name(input: &Path) -> Result<String> {
    let stem = input
        .file_name()
        .and_then(|name| name.to_str())
        .context("input file name is not valid UTF-8")?;
    let stem = stem
        .strip_suffix(".tsv")
        .or_else(|| stem.strip_suffix(".txt"))
        .unwrap_or(stem);
    Ok(format!("{stem}.parquet"))
}

fn handle_split(args: SplitDayArgs) -> Result<()> {
    let report = split_day(&args.input, &args.output_dir)
        .with_context(|| format!("failed to split {}", args.input.display()))?;
    println!(
        "validation: {} ({} rows)",
        report.validation_path.display(),
        report.validation_rows
    );
    println!("test: {} ({} rows)", report.test_path.display(), report.test_rows);
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let metadata = read_metadata(&args.path)
        .with_context(|| format!("failed to read metadata in {}", args.path.display()))?;

    let mut table = Table::new();
    table.set_header(vec!["file", "rows"]);
    for stat in &metadata.file_stats {
        table.add_row(vec![stat.file_name.clone(), stat.num_rows.to_string()]);
    }
    table.add_row(vec!["total".to_string(), metadata.total_rows().to_string()]);

    println!("{table}");
    println!("generated at {}", metadata.generated_at);
    println!(
        "workflow: {}",
        serde_json::to_string_pretty(&metadata.workflow)?
    );
    Ok(())
}
