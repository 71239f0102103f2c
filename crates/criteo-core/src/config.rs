use std::path::Path;

use polars::io::parquet::write::ParquetCompression;
use serde::{Deserialize, Serialize};

use crate::constants::{CAT_FEATURE_COUNT, NUM_EMBEDDINGS_PER_FEATURE};
use crate::error::{PreprocError, Result};
use crate::writer::ShufflePolicy;

pub const CONFIG_ENV_VAR: &str = "CRITEO_PREPROC_CONFIG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalEncoding {
    /// Bucket ids written as lowercase hexadecimal strings.
    #[default]
    Hex,
    Int64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCompression {
    #[default]
    Snappy,
    Zstd,
    Uncompressed,
}

impl OutputCompression {
    pub fn to_parquet(self) -> ParquetCompression {
        match self {
            OutputCompression::Snappy => ParquetCompression::Snappy,
            OutputCompression::Zstd => ParquetCompression::Zstd(None),
            OutputCompression::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocConfig {
    pub part_mem_fraction: f64,
    pub memory_bytes: Option<u64>,
    pub out_files_per_worker: usize,
    pub workers: Option<usize>,
    pub shuffle: ShufflePolicy,
    pub seed: u64,
    pub compression: OutputCompression,
    pub categorical_encoding: CategoricalEncoding,
    pub continuous_fill_value: f64,
    pub continuous_shift: f64,
    pub frequency_threshold: Option<u64>,
    pub num_embeddings_per_feature: Vec<u64>,
}

impl Default for PreprocConfig {
    fn default() -> Self {
        Self {
            part_mem_fraction: 0.05,
            memory_bytes: None,
            out_files_per_worker: 8,
            workers: None,
            shuffle: ShufflePolicy::PerWorker,
            seed: 42,
            compression: OutputCompression::default(),
            categorical_encoding: CategoricalEncoding::default(),
            continuous_fill_value: 0.0,
            continuous_shift: 2.0,
            frequency_threshold: None,
            num_embeddings_per_feature: NUM_EMBEDDINGS_PER_FEATURE.to_vec(),
        }
    }
}

impl PreprocConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: PreprocConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PreprocError::MissingInput(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Loads the file named by `CRITEO_PREPROC_CONFIG`, or the defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim())),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.part_mem_fraction > 0.0 && self.part_mem_fraction <= 1.0) {
            return Err(PreprocError::Config(format!(
                "part_mem_fraction must be in (0, 1], got {}",
                self.part_mem_fraction
            )));
        }
        if self.out_files_per_worker == 0 {
            return Err(PreprocError::Config(
                "out_files_per_worker must be at least 1".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(PreprocError::Config("workers must be at least 1".to_string()));
        }
        if self.num_embeddings_per_feature.len() != CAT_FEATURE_COUNT {
            return Err(PreprocError::Config(format!(
                "num_embeddings_per_feature needs {} entries, got {}",
                CAT_FEATURE_COUNT,
                self.num_embeddings_per_feature.len()
            )));
        }
        if let Some(idx) = self.num_embeddings_per_feature.iter().position(|n| *n == 0) {
            return Err(PreprocError::Config(format!(
                "num_embeddings_per_feature[{idx}] must be positive"
            )));
        }
        if self.frequency_threshold == Some(0) {
            return Err(PreprocError::Config(
                "frequency_threshold must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}
