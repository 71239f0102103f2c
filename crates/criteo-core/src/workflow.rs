use polars::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::{CategoricalEncoding, PreprocConfig};
use crate::constants::{DEFAULT_CAT_NAMES, DEFAULT_INT_NAMES, DEFAULT_LABEL_NAME};
use crate::dataset::{load_partition, Dataset};
use crate::error::{PreprocError, Result};
use crate::ops::{AddConstant, FillMissing, FrequencyFilter, HashBucket, LogOp, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Label,
    Continuous,
    Categorical,
}

/// A set of columns sharing one operator chain.
#[derive(Debug)]
pub struct ColumnGroup {
    pub kind: ColumnKind,
    pub columns: Vec<String>,
    ops: Vec<Box<dyn Operator>>,
}

impl ColumnGroup {
    pub fn new(kind: ColumnKind, columns: Vec<String>) -> Self {
        Self {
            kind,
            columns,
            ops: Vec::new(),
        }
    }

    pub fn then<O: Operator + 'static>(mut self, op: O) -> Self {
        self.ops.push(Box::new(op));
        self
    }

    pub fn ops(&self) -> &[Box<dyn Operator>] {
        &self.ops
    }

    fn stateful_indices(&self) -> Vec<usize> {
        self.ops
            .iter()
            .enumerate()
            .filter(|(_, op)| op.is_stateful())
            .map(|(idx, _)| idx)
            .collect()
    }

    fn apply(&self, series: &Series) -> Result<Series> {
        apply_chain(&self.ops, series)
    }
}

fn apply_chain(ops: &[Box<dyn Operator>], series: &Series) -> Result<Series> {
    let mut current = series.clone();
    for op in ops {
        current = op.transform(&current)?;
    }
    Ok(current)
}

#[derive(Debug)]
pub struct Workflow {
    groups: Vec<ColumnGroup>,
    encoding: CategoricalEncoding,
    fitted: bool,
}

impl Workflow {
    pub fn new(groups: Vec<ColumnGroup>, encoding: CategoricalEncoding) -> Self {
        Self {
            groups,
            encoding,
            fitted: false,
        }
    }

    /// Label passthrough, `int_*` through fill → shift → log, `cat_*` through
    /// (optional frequency filter) → fill → hash bucket.
    pub fn criteo(config: &PreprocConfig, num_embeddings_per_feature: &[u64]) -> Result<Self> {
        let label = ColumnGroup::new(ColumnKind::Label, vec![DEFAULT_LABEL_NAME.to_string()]);

        let continuous = ColumnGroup::new(ColumnKind::Continuous, DEFAULT_INT_NAMES.clone())
            .then(FillMissing {
                value: config.continuous_fill_value,
            })
            .then(AddConstant {
                value: config.continuous_shift,
            })
            .then(LogOp);

        let mut categorical = ColumnGroup::new(ColumnKind::Categorical, DEFAULT_CAT_NAMES.clone());
        if let Some(threshold) = config.frequency_threshold {
            categorical = categorical.then(FrequencyFilter::new(threshold));
        }
        let categorical = categorical
            .then(FillMissing::default())
            .then(HashBucket::from_columns(
                &DEFAULT_CAT_NAMES,
                num_embeddings_per_feature,
            )?);

        Ok(Self::new(
            vec![label, continuous, categorical],
            config.categorical_encoding,
        ))
    }

    pub fn groups(&self) -> &[ColumnGroup] {
        &self.groups
    }

    pub fn input_columns(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|group| group.columns.iter().cloned())
            .collect()
    }

    pub fn columns_of(&self, kind: ColumnKind) -> Vec<String> {
        self.groups
            .iter()
            .filter(|group| group.kind == kind)
            .flat_map(|group| group.columns.iter().cloned())
            .collect()
    }

    pub fn requires_fit(&self) -> bool {
        self.groups
            .iter()
            .any(|group| group.ops.iter().any(|op| op.is_stateful()))
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted || !self.requires_fit()
    }

    pub fn output_schema(&self) -> Schema {
        self.groups
            .iter()
            .flat_map(|group| {
                let dtype = self.output_dtype(group.kind);
                group
                    .columns
                    .iter()
                    .map(move |name| Field::new(name.as_str().into(), dtype.clone()))
            })
            .collect()
    }

    fn output_dtype(&self, kind: ColumnKind) -> DataType {
        match kind {
            ColumnKind::Label | ColumnKind::Continuous => DataType::Float32,
            ColumnKind::Categorical => match self.encoding {
                CategoricalEncoding::Hex => DataType::String,
                CategoricalEncoding::Int64 => DataType::Int64,
            },
        }
    }

    /// Streams the dataset once per stateful stage. Each stateful operator sees the output
    /// of the operators before it, which are already fit by earlier stages.
    pub fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        if !self.requires_fit() {
            self.fitted = true;
            return Ok(());
        }

        let stages = self
            .groups
            .iter()
            .map(|group| group.stateful_indices().len())
            .max()
            .unwrap_or(0);
        let columns = self.input_columns();

        for stage in 0..stages {
            for partition in dataset.partitions() {
                let df = load_partition(partition, &columns)?;
                self.fit_stage(stage, &df)?;
            }
            info!(stage, partitions = dataset.partitions().len(), "Fit stage complete");
        }

        self.fitted = true;
        Ok(())
    }

    /// Fits every stateful operator against one in-memory frame.
    pub fn fit_frame(&mut self, df: &DataFrame) -> Result<()> {
        let stages = self
            .groups
            .iter()
            .map(|group| group.stateful_indices().len())
            .max()
            .unwrap_or(0);
        for stage in 0..stages {
            self.fit_stage(stage, df)?;
        }
        self.fitted = true;
        Ok(())
    }

    fn fit_stage(&mut self, stage: usize, df: &DataFrame) -> Result<()> {
        for group in &mut self.groups {
            let Some(&op_idx) = group.stateful_indices().get(stage) else {
                continue;
            };
            let (upstream, rest) = group.ops.split_at_mut(op_idx);
            for name in &group.columns {
                let series = df.column(name.as_str())?.as_materialized_series();
                let prepared = apply_chain(upstream, series)?;
                rest[0].fit(&prepared)?;
            }
        }
        Ok(())
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted() {
            let op = self
                .groups
                .iter()
                .flat_map(|group| group.ops.iter())
                .find(|op| op.is_stateful())
                .map(|op| op.name())
                .unwrap_or("Workflow");
            return Err(PreprocError::NotFitted(op));
        }

        let mut columns: Vec<Column> = Vec::with_capacity(df.width());
        for group in &self.groups {
            for name in &group.columns {
                let series = df.column(name.as_str())?.as_materialized_series();
                let transformed = group.apply(series)?;
                columns.push(self.finalize(group.kind, transformed)?.into());
            }
        }

        Ok(DataFrame::new(columns)?)
    }

    fn finalize(&self, kind: ColumnKind, series: Series) -> Result<Series> {
        match (kind, self.encoding) {
            (ColumnKind::Categorical, CategoricalEncoding::Hex) => {
                let cast = series.cast(&DataType::Int64)?;
                let values: Vec<Option<String>> = cast
                    .i64()?
                    .into_iter()
                    .map(|v| v.map(|x| format!("{x:x}")))
                    .collect();
                Ok(Series::new(series.name().clone(), values))
            }
            _ => Ok(series.cast(&self.output_dtype(kind))?),
        }
    }

    pub fn describe(&self) -> Value {
        let groups: Vec<Value> = self
            .groups
            .iter()
            .map(|group| {
                json!({
                    "kind": group.kind,
                    "columns": group.columns,
                    "ops": group.ops.iter().map(|op| op.describe()).collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({
            "categorical_encoding": self.encoding,
            "fitted": self.is_fitted(),
            "groups": groups,
        })
    }
}
