use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info};

use crate::constants::{DEFAULT_CAT_NAMES, DEFAULT_COLUMN_NAMES};
use crate::error::{PreprocError, Result};

const SAMPLE_ROWS: IdxSize = 1024;

#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    pub num_rows: usize,
    pub bytes_per_row: usize,
}

/// A contiguous row range of a single input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub path: PathBuf,
    pub offset: usize,
    pub num_rows: usize,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    files: Vec<InputFile>,
    partitions: Vec<Partition>,
    part_size_bytes: u64,
}

impl Dataset {
    pub fn open<P: AsRef<Path>>(paths: &[P], part_size_bytes: u64) -> Result<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(inspect_file(path.as_ref())?);
        }

        let partitions = plan_partitions(&files, part_size_bytes);
        info!(
            files = files.len(),
            partitions = partitions.len(),
            part_size_bytes,
            total_rows = files.iter().map(|f| f.num_rows).sum::<usize>(),
            "Planned dataset partitions"
        );

        Ok(Self {
            files,
            partitions,
            part_size_bytes,
        })
    }

    pub fn files(&self) -> &[InputFile] {
        &self.files
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn part_size_bytes(&self) -> u64 {
        self.part_size_bytes
    }

    pub fn total_rows(&self) -> usize {
        self.files.iter().map(|f| f.num_rows).sum()
    }
}

fn inspect_file(path: &Path) -> Result<InputFile> {
    if !path.exists() {
        return Err(PreprocError::MissingInput(path.to_path_buf()));
    }

    let mut lf = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?;
    let schema = lf.collect_schema()?;
    let missing: Vec<&str> = DEFAULT_COLUMN_NAMES
        .iter()
        .map(String::as_str)
        .filter(|name| schema.get(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(PreprocError::SchemaMismatch {
            path: path.to_path_buf(),
            reason: format!("missing columns [{}]", missing.join(", ")),
        });
    }

    let counted = lf.clone().select([len()]).collect()?;
    let num_rows = counted
        .column("len")?
        .cast(&DataType::UInt64)?
        .u64()?
        .get(0)
        .unwrap_or(0) as usize;

    let bytes_per_row = if num_rows == 0 {
        1
    } else {
        let sample = lf.slice(0, SAMPLE_ROWS).collect()?;
        (sample.estimated_size() / sample.height().max(1)).max(1)
    };

    debug!(
        path = %path.display(),
        num_rows,
        bytes_per_row,
        "Inspected input file"
    );

    Ok(InputFile {
        path: path.to_path_buf(),
        num_rows,
        bytes_per_row,
    })
}

pub fn plan_partitions(files: &[InputFile], part_size_bytes: u64) -> Vec<Partition> {
    let mut partitions = Vec::new();
    for file in files {
        let rows_per_part = ((part_size_bytes / file.bytes_per_row.max(1) as u64) as usize).max(1);
        let mut offset = 0;
        while offset < file.num_rows {
            let num_rows = rows_per_part.min(file.num_rows - offset);
            partitions.push(Partition {
                index: partitions.len(),
                path: file.path.clone(),
                offset,
                num_rows,
            });
            offset += num_rows;
        }
    }
    partitions
}

/// Reads `columns` of one partition with normalised dtypes: label and continuous as Float64,
/// categorical as Int64.
pub fn load_partition(partition: &Partition, columns: &[String]) -> Result<DataFrame> {
    let selection: Vec<Expr> = columns.iter().map(|name| col(name.as_str())).collect();
    let df = LazyFrame::scan_parquet(&partition.path, ScanArgsParquet::default())?
        .slice(partition.offset as i64, partition.num_rows as IdxSize)
        .select(selection)
        .collect()?;

    let mut normalized = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let name = column.name().as_str();
        let series = column.as_materialized_series();
        let converted = if DEFAULT_CAT_NAMES.iter().any(|cat| cat == name) {
            normalize_categorical(series, &partition.path)?
        } else {
            series.cast(&DataType::Float64)?
        };
        normalized.push(converted.into());
    }

    Ok(DataFrame::new(normalized)?)
}

fn normalize_categorical(series: &Series, path: &Path) -> Result<Series> {
    match series.dtype() {
        DataType::String => {
            let values: Vec<Option<i64>> = series
                .str()?
                .into_iter()
                .map(|value| value.and_then(decode_hex))
                .collect();
            Ok(Series::new(series.name().clone(), values))
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Ok(series.cast(&DataType::Int64)?),
        other => Err(PreprocError::SchemaMismatch {
            path: path.to_path_buf(),
            reason: format!(
                "categorical column '{}' has unsupported dtype {other}",
                series.name()
            ),
        }),
    }
}

/// Base-16 decode of a raw Criteo categorical token. Empty, signed or malformed tokens are
/// missing.
pub fn decode_hex(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    i64::from_str_radix(trimmed, 16).ok()
}
