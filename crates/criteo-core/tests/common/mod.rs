#![allow(dead_code)]

use std::fs::File;
use std::path::Path;

use criteo_core::constants::{DEFAULT_CAT_NAMES, DEFAULT_INT_NAMES, DEFAULT_LABEL_NAME};
use polars::prelude::*;

/// Raw Criteo-shaped frame: Int32 label, Int64 ints and cats, with a sprinkling of nulls.
pub fn raw_frame(rows: usize, seed: i64) -> DataFrame {
    let mut columns: Vec<Column> = Vec::with_capacity(40);
    columns.push(
        Series::new(
            DEFAULT_LABEL_NAME.into(),
            (0..rows).map(|r| ((r as i64 + seed) % 2) as i32).collect::<Vec<_>>(),
        )
        .into(),
    );
    for (idx, name) in DEFAULT_INT_NAMES.iter().enumerate() {
        let values: Vec<Option<i64>> = (0..rows)
            .map(|r| {
                let r = r as i64 + seed;
                if (r + idx as i64) % 4 == 0 {
                    None
                } else {
                    Some((r * 3 + idx as i64) % 20)
                }
            })
            .collect();
        columns.push(Series::new(name.as_str().into(), values).into());
    }
    for (idx, name) in DEFAULT_CAT_NAMES.iter().enumerate() {
        let values: Vec<Option<i64>> = (0..rows)
            .map(|r| {
                let r = r as i64 + seed;
                if (r + idx as i64) % 5 == 0 {
                    None
                } else {
                    Some(0x1000 * (idx as i64 + 1) + r % 7)
                }
            })
            .collect();
        columns.push(Series::new(name.as_str().into(), values).into());
    }
    DataFrame::new(columns).expect("fixture frame")
}

/// Same content as `raw_frame` with categorical columns stored as hex strings.
pub fn raw_frame_hex(rows: usize, seed: i64) -> DataFrame {
    let mut df = raw_frame(rows, seed);
    for name in DEFAULT_CAT_NAMES.iter() {
        let values: Vec<Option<String>> = df
            .column(name.as_str())
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|x| format!("{x:08x}")))
            .collect();
        df.with_column(Series::new(name.as_str().into(), values))
            .unwrap();
    }
    df
}

pub fn write_parquet(path: &Path, df: &DataFrame) {
    let mut clone = df.clone();
    ParquetWriter::new(File::create(path).expect("create parquet"))
        .finish(&mut clone)
        .expect("write parquet");
}

/// Reads a whole parquet file. The scan runs on its own thread because polars starts a
/// runtime of its own, which cannot nest inside a `#[tokio::test]` body.
pub fn read_parquet(path: &Path) -> DataFrame {
    std::thread::scope(|scope| {
        scope
            .spawn(|| LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect())
            .join()
            .expect("parquet reader thread")
    })
    .expect("read parquet")
}
