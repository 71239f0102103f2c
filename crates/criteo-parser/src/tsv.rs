use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use criteo_core::constants::{
    CAT_FEATURE_COUNT, DEFAULT_CAT_NAMES, DEFAULT_INT_NAMES, DEFAULT_LABEL_NAME,
    INT_FEATURE_COUNT,
};
use criteo_core::dataset::decode_hex;
use csv::{ReaderBuilder, StringRecord};
use polars::io::parquet::write::{ParquetCompression, ParquetWriter};
use polars::prelude::*;
use tracing::{info, warn};

use crate::errors::ParserError;

pub const DEFAULT_BATCH_ROWS: usize = 1_000_000;

const FIELD_COUNT: usize = 1 + INT_FEATURE_COUNT + CAT_FEATURE_COUNT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub rows: usize,
    pub batches: usize,
}

/// Schema of a converted day file: Int32 label, Int64 integer features, Int64 hex-decoded
/// categorical features.
pub fn raw_schema() -> Schema {
    let mut fields = Vec::with_capacity(FIELD_COUNT);
    fields.push(Field::new(DEFAULT_LABEL_NAME.into(), DataType::Int32));
    for name in DEFAULT_INT_NAMES.iter() {
        fields.push(Field::new(name.as_str().into(), DataType::Int64));
    }
    for name in DEFAULT_CAT_NAMES.iter() {
        fields.push(Field::new(name.as_str().into(), DataType::Int64));
    }
    fields.into_iter().collect()
}

struct ColumnBuffers {
    label: Vec<Option<i32>>,
    ints: Vec<Vec<Option<i64>>>,
    cats: Vec<Vec<Option<i64>>>,
}

impl ColumnBuffers {
    fn with_capacity(rows: usize) -> Self {
        Self {
            label: Vec::with_capacity(rows),
            ints: (0..INT_FEATURE_COUNT)
                .map(|_| Vec::with_capacity(rows))
                .collect(),
            cats: (0..CAT_FEATURE_COUNT)
                .map(|_| Vec::with_capacity(rows))
                .collect(),
        }
    }

    fn len(&self) -> usize {
        self.label.len()
    }

    fn push_record(&mut self, record: &StringRecord, line_index: usize) -> Result<(), ParserError> {
        if record.len() != FIELD_COUNT {
            return Err(ParserError::DataRow {
                line_index,
                message: format!("expected {FIELD_COUNT} fields, found {}", record.len()),
            });
        }

        let label = record
            .get(0)
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| ParserError::DataRow {
                line_index,
                message: "label is empty".to_string(),
            })?;
        let label: i32 = label.parse().map_err(|_| ParserError::DataRow {
            line_index,
            message: format!("label '{label}' is not an integer"),
        })?;

        let mut ints = [None; INT_FEATURE_COUNT];
        for (idx, slot) in ints.iter_mut().enumerate() {
            let raw = record.get(1 + idx).unwrap_or("").trim();
            if raw.is_empty() {
                continue;
            }
            *slot = Some(raw.parse::<i64>().map_err(|_| ParserError::DataRow {
                line_index,
                message: format!("{} value '{raw}' is not an integer", DEFAULT_INT_NAMES[idx]),
            })?);
        }

        let mut cats = [None; CAT_FEATURE_COUNT];
        for (idx, slot) in cats.iter_mut().enumerate() {
            let raw = record.get(1 + INT_FEATURE_COUNT + idx).unwrap_or("").trim();
            if raw.is_empty() {
                continue;
            }
            *slot = Some(decode_hex(raw).ok_or_else(|| ParserError::DataRow {
                line_index,
                message: format!("{} value '{raw}' is not hexadecimal", DEFAULT_CAT_NAMES[idx]),
            })?);
        }

        self.label.push(Some(label));
        for (column, value) in self.ints.iter_mut().zip(ints) {
            column.push(value);
        }
        for (column, value) in self.cats.iter_mut().zip(cats) {
            column.push(value);
        }
        Ok(())
    }

    fn take_frame(&mut self) -> Result<DataFrame, ParserError> {
        let rows = self.len();
        let drained = std::mem::replace(self, ColumnBuffers::with_capacity(rows));

        let mut columns: Vec<Column> = Vec::with_capacity(FIELD_COUNT);
        columns.push(Series::new(DEFAULT_LABEL_NAME.into(), drained.label).into());
        for (name, values) in DEFAULT_INT_NAMES.iter().zip(drained.ints) {
            columns.push(Series::new(name.as_str().into(), values).into());
        }
        for (name, values) in DEFAULT_CAT_NAMES.iter().zip(drained.cats) {
            columns.push(Series::new(name.as_str().into(), values).into());
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Streams tab-separated Criteo rows into frames of at most `batch_rows` rows. Returns the
/// number of rows read.
pub fn parse_tsv_reader<R, F>(reader: R, batch_rows: usize, mut sink: F) -> Result<usize, ParserError>
where
    R: Read,
    F: FnMut(DataFrame) -> Result<(), ParserError>,
{
    let batch_rows = batch_rows.max(1);
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut buffers = ColumnBuffers::with_capacity(batch_rows);
    let mut record = StringRecord::new();
    let mut rows = 0;

    while csv_reader.read_record(&mut record)? {
        rows += 1;
        buffers.push_record(&record, rows)?;
        if buffers.len() >= batch_rows {
            sink(buffers.take_frame()?)?;
        }
    }

    if buffers.len() > 0 {
        sink(buffers.take_frame()?)?;
    }

    Ok(rows)
}

pub fn convert_tsv_file(
    input: &Path,
    output: &Path,
    batch_rows: usize,
) -> Result<ConversionReport, ParserError> {
    let source = File::open(input)?;
    let target = File::create(output)?;
    let mut writer = ParquetWriter::new(target)
        .with_compression(ParquetCompression::Snappy)
        .batched(&raw_schema())?;

    let mut batches = 0;
    let written = parse_tsv_reader(source, batch_rows, |frame| {
        writer.write_batch(&frame)?;
        batches += 1;
        Ok(())
    })
    .and_then(|rows| {
        writer.finish()?;
        Ok(rows)
    });
    let rows = match written {
        Ok(rows) => rows,
        Err(err) => {
            // a parquet file without its footer is unreadable
            drop(writer);
            if let Err(cleanup) = std::fs::remove_file(output) {
                warn!(output = %output.display(), error = %cleanup, "Failed to remove partial output");
            }
            return Err(err);
        }
    };

    if rows == 0 {
        std::fs::remove_file(output)?;
        return Err(ParserError::EmptyData {
            path: input.to_path_buf(),
        });
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        rows,
        batches,
        "Converted TSV day file"
    );

    Ok(ConversionReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        rows,
        batches,
    })
}
