use std::collections::HashMap;
use std::fmt;

use polars::prelude::*;
use serde_json::{json, Value};

use crate::error::{PreprocError, Result};

/// A column-wise transform step. Stateful operators see every partition through `fit`
/// before any `transform` call.
pub trait Operator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn is_stateful(&self) -> bool {
        false
    }

    fn fit(&mut self, _series: &Series) -> Result<()> {
        Ok(())
    }

    fn transform(&self, series: &Series) -> Result<Series>;

    fn describe(&self) -> Value {
        json!({ "op": self.name() })
    }
}

#[derive(Debug, Clone)]
pub struct FillMissing {
    pub value: f64,
}

impl Default for FillMissing {
    fn default() -> Self {
        Self { value: 0.0 }
    }
}

impl Operator for FillMissing {
    fn name(&self) -> &'static str {
        "FillMissing"
    }

    fn transform(&self, series: &Series) -> Result<Series> {
        let name = series.name().clone();
        match series.dtype() {
            DataType::Int64 => {
                let fill = self.value as i64;
                let values: Vec<i64> = series
                    .i64()?
                    .into_iter()
                    .map(|v| v.unwrap_or(fill))
                    .collect();
                Ok(Series::new(name, values))
            }
            _ => {
                let cast = series.cast(&DataType::Float64)?;
                let values: Vec<f64> = cast
                    .f64()?
                    .into_iter()
                    .map(|v| v.unwrap_or(self.value))
                    .collect();
                Ok(Series::new(name, values))
            }
        }
    }

    fn describe(&self) -> Value {
        json!({ "op": self.name(), "fill_value": self.value })
    }
}

/// Adds a constant to every present value.
#[derive(Debug, Clone)]
pub struct AddConstant {
    pub value: f64,
}

impl Operator for AddConstant {
    fn name(&self) -> &'static str {
        "AddConstant"
    }

    fn transform(&self, series: &Series) -> Result<Series> {
        let cast = series.cast(&DataType::Float64)?;
        let values: Vec<Option<f64>> = cast
            .f64()?
            .into_iter()
            .map(|v| v.map(|x| x + self.value))
            .collect();
        Ok(Series::new(series.name().clone(), values))
    }

    fn describe(&self) -> Value {
        json!({ "op": self.name(), "value": self.value })
    }
}

/// `ln(1 + x)`. Values at or below -1 produce `-inf`/NaN; they are not clipped.
#[derive(Debug, Clone, Default)]
pub struct LogOp;

impl Operator for LogOp {
    fn name(&self) -> &'static str {
        "LogOp"
    }

    fn transform(&self, series: &Series) -> Result<Series> {
        let cast = series.cast(&DataType::Float64)?;
        let values: Vec<Option<f64>> = cast
            .f64()?
            .into_iter()
            .map(|v| v.map(f64::ln_1p))
            .collect();
        Ok(Series::new(series.name().clone(), values))
    }
}

#[derive(Debug, Clone)]
pub struct HashBucket {
    buckets: HashMap<String, u64>,
}

impl HashBucket {
    pub fn new(buckets: HashMap<String, u64>) -> Result<Self> {
        if let Some((column, _)) = buckets.iter().find(|(_, n)| **n == 0) {
            return Err(PreprocError::Config(format!(
                "hash bucket count for '{column}' must be positive"
            )));
        }
        Ok(Self { buckets })
    }

    pub fn from_columns(columns: &[String], counts: &[u64]) -> Result<Self> {
        if columns.len() != counts.len() {
            return Err(PreprocError::Config(format!(
                "{} categorical columns but {} bucket counts",
                columns.len(),
                counts.len()
            )));
        }
        Self::new(columns.iter().cloned().zip(counts.iter().copied()).collect())
    }

    pub fn buckets_for(&self, column: &str) -> Option<u64> {
        self.buckets.get(column).copied()
    }
}

impl Operator for HashBucket {
    fn name(&self) -> &'static str {
        "HashBucket"
    }

    fn transform(&self, series: &Series) -> Result<Series> {
        let column = series.name().as_str();
        let num_buckets = self
            .buckets_for(column)
            .ok_or_else(|| PreprocError::UnknownColumn {
                operator: "HashBucket",
                column: column.to_string(),
            })?;

        let cast = series.cast(&DataType::Int64)?;
        let values: Vec<Option<i64>> = cast
            .i64()?
            .into_iter()
            .map(|v| v.map(|x| bucket_for(x, num_buckets) as i64))
            .collect();
        Ok(Series::new(series.name().clone(), values))
    }

    fn describe(&self) -> Value {
        let mut sorted: Vec<(&String, &u64)> = self.buckets.iter().collect();
        sorted.sort();
        let buckets: serde_json::Map<String, Value> = sorted
            .into_iter()
            .map(|(name, count)| (name.clone(), json!(count)))
            .collect();
        json!({ "op": self.name(), "num_buckets": buckets })
    }
}

pub fn hash_value(value: i64) -> u64 {
    let digest = blake3::hash(&value.to_le_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

pub fn bucket_for(value: i64, num_buckets: u64) -> u64 {
    hash_value(value) % num_buckets
}

/// Nulls out categorical values seen fewer than `threshold` times during fit.
#[derive(Debug, Clone)]
pub struct FrequencyFilter {
    threshold: u64,
    counts: HashMap<String, HashMap<i64, u64>>,
    fitted: bool,
}

impl FrequencyFilter {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            counts: HashMap::new(),
            fitted: false,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Distinct values per column that survive the threshold.
    pub fn kept_values(&self, column: &str) -> usize {
        self.counts
            .get(column)
            .map(|counts| counts.values().filter(|n| **n >= self.threshold).count())
            .unwrap_or(0)
    }
}

impl Operator for FrequencyFilter {
    fn name(&self) -> &'static str {
        "FrequencyFilter"
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn fit(&mut self, series: &Series) -> Result<()> {
        let cast = series.cast(&DataType::Int64)?;
        let counts = self
            .counts
            .entry(series.name().to_string())
            .or_default();
        for value in cast.i64()?.into_iter().flatten() {
            *counts.entry(value).or_insert(0) += 1;
        }
        self.fitted = true;
        Ok(())
    }

    fn transform(&self, series: &Series) -> Result<Series> {
        if !self.fitted {
            return Err(PreprocError::NotFitted("FrequencyFilter"));
        }
        let column = series.name().as_str();
        let counts = self
            .counts
            .get(column)
            .ok_or_else(|| PreprocError::UnknownColumn {
                operator: "FrequencyFilter",
                column: column.to_string(),
            })?;

        let cast = series.cast(&DataType::Int64)?;
        let values: Vec<Option<i64>> = cast
            .i64()?
            .into_iter()
            .map(|v| v.filter(|x| counts.get(x).copied().unwrap_or(0) >= self.threshold))
            .collect();
        Ok(Series::new(series.name().clone(), values))
    }

    fn describe(&self) -> Value {
        let mut columns: Vec<&String> = self.counts.keys().collect();
        columns.sort();
        let kept: serde_json::Map<String, Value> = columns
            .into_iter()
            .map(|name| (name.clone(), json!(self.kept_values(name))))
            .collect();
        json!({ "op": self.name(), "threshold": self.threshold, "kept_values": kept })
    }
}
