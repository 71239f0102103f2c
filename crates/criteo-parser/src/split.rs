use std::fs::File;
use std::path::{Path, PathBuf};

use criteo_core::constants::{test_file_name, validation_file_name};
use polars::io::parquet::write::{ParquetCompression, ParquetWriter};
use polars::prelude::*;
use tracing::info;

use crate::errors::ParserError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub validation_path: PathBuf,
    pub validation_rows: usize,
    pub test_path: PathBuf,
    pub test_rows: usize,
}

/// Splits the last day file in two: the first half of the rows becomes the validation
/// file, the rest the test file.
pub fn split_day(input: &Path, output_dir: &Path) -> Result<SplitReport, ParserError> {
    if !input.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", input.display()),
        )
        .into());
    }

    let lf = LazyFrame::scan_parquet(input, ScanArgsParquet::default())?;
    let counted = lf.clone().select([len()]).collect()?;
    let total = counted
        .column("len")?
        .cast(&DataType::UInt64)?
        .u64()?
        .get(0)
        .unwrap_or(0) as usize;
    if total == 0 {
        return Err(ParserError::EmptyData {
            path: input.to_path_buf(),
        });
    }

    let validation_rows = total / 2;
    let test_rows = total - validation_rows;

    std::fs::create_dir_all(output_dir)?;
    let validation_path = output_dir.join(validation_file_name());
    let test_path = output_dir.join(test_file_name());

    let mut validation = lf
        .clone()
        .slice(0, validation_rows as IdxSize)
        .collect()?;
    write_parquet(&validation_path, &mut validation)?;

    let mut test = lf.slice(validation_rows as i64, test_rows as IdxSize).collect()?;
    write_parquet(&test_path, &mut test)?;

    info!(
        input = %input.display(),
        validation_rows,
        test_rows,
        "Split day file"
    );

    Ok(SplitReport {
        validation_path,
        validation_rows,
        test_path,
        test_rows,
    })
}

fn write_parquet(path: &Path, df: &mut DataFrame) -> Result<(), ParserError> {
    let file = File::create(path)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(df)?;
    Ok(())
}
