use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use polars::io::parquet::write::{BatchedWriter, ParquetCompression, ParquetWriter};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{PreprocError, Result};

pub const FILE_LIST_NAME: &str = "_file_list.txt";
pub const METADATA_NAME: &str = "_metadata.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShufflePolicy {
    None,
    PerPartition,
    #[default]
    PerWorker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub file_name: String,
    pub num_rows: usize,
}

pub fn shard_file_name(global_index: usize) -> String {
    format!("part_{global_index}.parquet")
}

struct ShardFile {
    file_name: String,
    writer: BatchedWriter<File>,
    num_rows: usize,
}

/// Output files owned by one worker.
pub struct ShardWriter {
    worker: usize,
    files: Vec<ShardFile>,
    policy: ShufflePolicy,
    rng: StdRng,
    next_file: usize,
}

impl ShardWriter {
    pub fn create(
        dir: &Path,
        worker: usize,
        files_per_worker: usize,
        schema: &Schema,
        compression: ParquetCompression,
        policy: ShufflePolicy,
        seed: u64,
    ) -> Result<Self> {
        if files_per_worker == 0 {
            return Err(PreprocError::Config(
                "a worker needs at least one output file".to_string(),
            ));
        }

        let mut files = Vec::with_capacity(files_per_worker);
        for slot in 0..files_per_worker {
            let file_name = shard_file_name(worker * files_per_worker + slot);
            let handle = File::create(dir.join(&file_name))?;
            let writer = ParquetWriter::new(handle)
                .with_compression(compression)
                .batched(schema)?;
            files.push(ShardFile {
                file_name,
                writer,
                num_rows: 0,
            });
        }

        Ok(Self {
            worker,
            files,
            policy,
            rng: StdRng::seed_from_u64(worker_seed(seed, worker)),
            next_file: 0,
        })
    }

    pub fn write_partition(&mut self, df: &DataFrame) -> Result<()> {
        let height = df.height();
        if height == 0 {
            return Ok(());
        }

        match self.policy {
            ShufflePolicy::None => {
                let slot = self.next_slot();
                self.write_to(slot, df)
            }
            ShufflePolicy::PerPartition => {
                let mut order: Vec<IdxSize> = (0..height as IdxSize).collect();
                order.shuffle(&mut self.rng);
                let shuffled = take_rows(df, order)?;
                let slot = self.next_slot();
                self.write_to(slot, &shuffled)
            }
            ShufflePolicy::PerWorker => {
                let mut buckets: Vec<Vec<IdxSize>> = vec![Vec::new(); self.files.len()];
                for row in 0..height as IdxSize {
                    let slot = self.rng.gen_range(0..self.files.len());
                    buckets[slot].push(row);
                }
                for (slot, mut rows) in buckets.into_iter().enumerate() {
                    if rows.is_empty() {
                        continue;
                    }
                    rows.shuffle(&mut self.rng);
                    let chunk = take_rows(df, rows)?;
                    self.write_to(slot, &chunk)?;
                }
                Ok(())
            }
        }
    }

    fn next_slot(&mut self) -> usize {
        let slot = self.next_file;
        self.next_file = (self.next_file + 1) % self.files.len();
        slot
    }

    fn write_to(&mut self, slot: usize, df: &DataFrame) -> Result<()> {
        let shard = &mut self.files[slot];
        shard.writer.write_batch(df)?;
        shard.num_rows += df.height();
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<FileStat>> {
        let worker = self.worker;
        let mut stats = Vec::with_capacity(self.files.len());
        for shard in self.files {
            shard.writer.finish()?;
            debug!(
                worker,
                file = %shard.file_name,
                rows = shard.num_rows,
                "Closed output shard"
            );
            stats.push(FileStat {
                file_name: shard.file_name,
                num_rows: shard.num_rows,
            });
        }
        Ok(stats)
    }
}

fn worker_seed(seed: u64, worker: usize) -> u64 {
    seed.wrapping_add((worker as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn take_rows(df: &DataFrame, rows: Vec<IdxSize>) -> Result<DataFrame> {
    let indices = IdxCa::from_vec("row".into(), rows);
    Ok(df.take(&indices)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub generated_at: String,
    pub data_paths: Vec<String>,
    pub file_stats: Vec<FileStat>,
    pub cats: Vec<String>,
    pub conts: Vec<String>,
    pub labels: Vec<String>,
    #[serde(default)]
    pub workflow: Value,
}

impl DatasetMetadata {
    pub fn new(
        mut file_stats: Vec<FileStat>,
        cats: Vec<String>,
        conts: Vec<String>,
        labels: Vec<String>,
        workflow: Value,
    ) -> Self {
        file_stats.sort_by_key(|stat| shard_index(&stat.file_name));
        Self {
            generated_at: Utc::now().to_rfc3339(),
            data_paths: file_stats.iter().map(|s| s.file_name.clone()).collect(),
            file_stats,
            cats,
            conts,
            labels,
            workflow,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.file_stats.iter().map(|s| s.num_rows).sum()
    }
}

fn shard_index(file_name: &str) -> usize {
    file_name
        .strip_prefix("part_")
        .and_then(|rest| rest.strip_suffix(".parquet"))
        .and_then(|idx| idx.parse().ok())
        .unwrap_or(usize::MAX)
}

pub fn write_metadata(dir: &Path, metadata: &DatasetMetadata) -> Result<()> {
    let mut list = File::create(dir.join(FILE_LIST_NAME))?;
    writeln!(list, "{}", metadata.data_paths.len())?;
    for path in &metadata.data_paths {
        writeln!(list, "{path}")?;
    }

    let json = serde_json::to_vec_pretty(metadata)?;
    std::fs::write(dir.join(METADATA_NAME), json)?;
    Ok(())
}

pub fn read_metadata(dir: &Path) -> Result<DatasetMetadata> {
    let path = dir.join(METADATA_NAME);
    if !path.exists() {
        return Err(PreprocError::MissingInput(path));
    }
    let raw = std::fs::read(&path)?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_names_sort_numerically() {
        let metadata = DatasetMetadata::new(
            vec![
                FileStat {
                    file_name: shard_file_name(10),
                    num_rows: 1,
                },
                FileStat {
                    file_name: shard_file_name(2),
                    num_rows: 2,
                },
            ],
            vec![],
            vec![],
            vec![],
            Value::Null,
        );
        assert_eq!(metadata.data_paths, vec!["part_2.parquet", "part_10.parquet"]);
        assert_eq!(metadata.total_rows(), 3);
    }

    fn ids(rows: i64) -> DataFrame {
        DataFrame::new(vec![Series::new("id".into(), (0..rows).collect::<Vec<i64>>()).into()])
            .unwrap()
    }

    fn write_shards(
        dir: &Path,
        files: usize,
        policy: ShufflePolicy,
        partitions: &[DataFrame],
    ) -> Vec<FileStat> {
        let schema = Schema::from_iter([Field::new("id".into(), DataType::Int64)]);
        let mut writer = ShardWriter::create(
            dir,
            0,
            files,
            &schema,
            ParquetCompression::Uncompressed,
            policy,
            42,
        )
        .unwrap();
        for partition in partitions {
            writer.write_partition(partition).unwrap();
        }
        writer.finish().unwrap()
    }

    fn read_ids(dir: &Path, stats: &[FileStat]) -> Vec<Vec<i64>> {
        stats
            .iter()
            .map(|stat| {
                LazyFrame::scan_parquet(dir.join(&stat.file_name), ScanArgsParquet::default())
                    .and_then(|lf| lf.collect())
                    .unwrap()
                    .column("id")
                    .unwrap()
                    .i64()
                    .unwrap()
                    .into_no_null_iter()
                    .collect()
            })
            .collect()
    }

    #[test]
    fn per_worker_spreads_rows_over_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let stats = write_shards(dir.path(), 3, ShufflePolicy::PerWorker, &[ids(100)]);

        let counts: Vec<usize> = stats.iter().map(|s| s.num_rows).collect();
        assert_eq!(counts.iter().sum::<usize>(), 100);
        assert!(counts.iter().all(|&n| n > 0), "{counts:?}");

        let shards = read_ids(dir.path(), &stats);
        for (shard, stat) in shards.iter().zip(&stats) {
            assert_eq!(shard.len(), stat.num_rows);
        }
        let mut all: Vec<i64> = shards.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<i64>>());
    }

    #[test]
    fn per_partition_permutes_within_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let stats = write_shards(dir.path(), 3, ShufflePolicy::PerPartition, &[ids(100)]);

        let counts: Vec<usize> = stats.iter().map(|s| s.num_rows).collect();
        assert_eq!(counts, vec![100, 0, 0]);

        let mut written = read_ids(dir.path(), &stats).remove(0);
        assert_ne!(written, (0..100).collect::<Vec<i64>>());
        written.sort_unstable();
        assert_eq!(written, (0..100).collect::<Vec<i64>>());
    }

    #[test]
    fn unshuffled_partitions_go_round_robin() {
        let dir = tempfile::tempdir().unwrap();
        let partitions = [ids(10), ids(4), ids(7)];
        let stats = write_shards(dir.path(), 2, ShufflePolicy::None, &partitions);

        let counts: Vec<usize> = stats.iter().map(|s| s.num_rows).collect();
        assert_eq!(counts, vec![17, 4]);

        let shards = read_ids(dir.path(), &stats);
        let mut expected_first: Vec<i64> = (0..10).collect();
        expected_first.extend(0..7);
        assert_eq!(shards[0], expected_first);
        assert_eq!(shards[1], (0..4).collect::<Vec<i64>>());
    }

    #[test]
    fn worker_seeds_differ() {
        assert_ne!(worker_seed(42, 0), worker_seed(42, 1));
        assert_eq!(worker_seed(42, 0), 42);
    }
}
