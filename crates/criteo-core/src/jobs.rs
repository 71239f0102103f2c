use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use serde::Serialize;
use tokio::task;
use tracing::{info, warn};

use crate::config::PreprocConfig;
use crate::constants::{
    test_file_name, train_file_names, validation_file_name, CAT_FEATURE_COUNT, INPUT_DIR_NAME,
    OUTPUT_DIR_NAME,
};
use crate::dataset::{load_partition, Dataset, Partition};
use crate::error::{PreprocError, Result};
use crate::memory;
use crate::workflow::{ColumnKind, Workflow};
use crate::writer::{write_metadata, DatasetMetadata, FileStat, ShardWriter};

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub output_path: PathBuf,
    pub input_files: usize,
    pub partitions: usize,
    pub workers: usize,
    pub rows_in: usize,
    pub rows_out: usize,
    pub output_files: usize,
    pub elapsed_secs: f64,
}

/// Fits the Criteo workflow on `input_paths` and writes the transformed, sharded dataset
/// into `output_path`.
pub async fn process_criteo(
    name: &str,
    input_paths: Vec<PathBuf>,
    output_path: &Path,
    num_embeddings_per_feature: &[u64],
    config: &PreprocConfig,
) -> Result<JobSummary> {
    let started = Instant::now();
    config.validate()?;
    if num_embeddings_per_feature.len() != CAT_FEATURE_COUNT {
        return Err(PreprocError::Config(format!(
            "expected {} embedding sizes, got {}",
            CAT_FEATURE_COUNT,
            num_embeddings_per_feature.len()
        )));
    }

    let total_memory = memory::total_memory_bytes(config);
    let part_size = memory::partition_size_bytes(total_memory, config.part_mem_fraction);
    info!(
        job = name,
        inputs = input_paths.len(),
        total_memory,
        part_size,
        "Starting preprocessing job"
    );

    let dataset = task::spawn_blocking(move || Dataset::open(input_paths.as_slice(), part_size))
        .await
        .map_err(|err| stage_error("dataset open", err))??;

    let mut workflow = Workflow::criteo(config, num_embeddings_per_feature)?;
    let workflow = if workflow.requires_fit() {
        let fit_dataset = dataset.clone();
        task::spawn_blocking(move || {
            workflow.fit(&fit_dataset)?;
            Ok::<_, PreprocError>(workflow)
        })
        .await
        .map_err(|err| stage_error("workflow fit", err))??
    } else {
        workflow.fit(&dataset)?;
        workflow
    };

    std::fs::create_dir_all(output_path)?;

    let partitions = dataset.partitions().to_vec();
    let workers = config.worker_count().min(partitions.len()).max(1);
    if partitions.is_empty() {
        warn!(job = name, "Dataset has no rows; writing empty shards");
    }

    let workflow = Arc::new(workflow);
    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let assigned: Vec<Partition> = partitions
                .iter()
                .skip(worker)
                .step_by(workers)
                .cloned()
                .collect();
            let workflow = Arc::clone(&workflow);
            let output = output_path.to_path_buf();
            let config = config.clone();
            task::spawn_blocking(move || run_worker(worker, assigned, &workflow, &output, &config))
        })
        .collect();

    let results = try_join_all(handles.into_iter().enumerate().map(|(worker, handle)| async move {
        handle.await.map_err(|err| join_error(worker, err))?
    }))
    .await?;
    let file_stats: Vec<FileStat> = results.into_iter().flatten().collect();

    let metadata = DatasetMetadata::new(
        file_stats,
        workflow.columns_of(ColumnKind::Categorical),
        workflow.columns_of(ColumnKind::Continuous),
        workflow.columns_of(ColumnKind::Label),
        workflow.describe(),
    );
    write_metadata(output_path, &metadata)?;

    let summary = JobSummary {
        name: name.to_string(),
        output_path: output_path.to_path_buf(),
        input_files: dataset.files().len(),
        partitions: partitions.len(),
        workers,
        rows_in: dataset.total_rows(),
        rows_out: metadata.total_rows(),
        output_files: metadata.file_stats.len(),
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    info!(
        job = name,
        rows_in = summary.rows_in,
        rows_out = summary.rows_out,
        files = summary.output_files,
        elapsed_secs = summary.elapsed_secs,
        "Finished preprocessing job"
    );
    Ok(summary)
}

fn run_worker(
    worker: usize,
    partitions: Vec<Partition>,
    workflow: &Workflow,
    output: &Path,
    config: &PreprocConfig,
) -> Result<Vec<FileStat>> {
    let schema = workflow.output_schema();
    let columns = workflow.input_columns();
    let mut writer = ShardWriter::create(
        output,
        worker,
        config.out_files_per_worker,
        &schema,
        config.compression.to_parquet(),
        config.shuffle,
        config.seed,
    )?;

    for partition in &partitions {
        let raw = load_partition(partition, &columns)?;
        let transformed = workflow.transform(&raw)?;
        writer.write_partition(&transformed)?;
    }

    let stats = writer.finish()?;
    info!(
        worker,
        partitions = partitions.len(),
        rows = stats.iter().map(|s| s.num_rows).sum::<usize>(),
        "Worker finished"
    );
    Ok(stats)
}

fn stage_error(stage: &'static str, err: task::JoinError) -> PreprocError {
    PreprocError::Task {
        stage,
        message: err.to_string(),
    }
}

fn join_error(worker: usize, err: task::JoinError) -> PreprocError {
    PreprocError::Worker {
        worker,
        message: err.to_string(),
    }
}

/// Runs the train, validation and test jobs for `<base_path>/criteo_parquet`, replacing
/// `<base_path>/criteo_preproc`.
pub async fn run_all(base_path: &Path, config: &PreprocConfig) -> Result<Vec<JobSummary>> {
    config.validate()?;

    let input_path = base_path.join(INPUT_DIR_NAME);
    if !input_path.exists() {
        return Err(PreprocError::MissingCriteoInput(input_path));
    }

    let output_path = base_path.join(OUTPUT_DIR_NAME);
    if output_path.exists() {
        info!(path = %output_path.display(), "Removing previous output");
        std::fs::remove_dir_all(&output_path)?;
    }
    std::fs::create_dir_all(&output_path)?;

    let jobs: [(&str, Vec<String>); 3] = [
        ("train", train_file_names()),
        ("validation", vec![validation_file_name()]),
        ("test", vec![test_file_name()]),
    ];

    let mut summaries = Vec::with_capacity(jobs.len());
    for (name, files) in jobs {
        let inputs = files.iter().map(|file| input_path.join(file)).collect();
        let summary = process_criteo(
            name,
            inputs,
            &output_path.join(name),
            &config.num_embeddings_per_feature,
            config,
        )
        .await?;
        summaries.push(summary);
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_stage_failures_name_the_stage() {
        let join = task::spawn_blocking(|| panic!("open failed"))
            .await
            .expect_err("panicked task");
        let err = stage_error("dataset open", join);

        assert!(matches!(err, PreprocError::Task { stage: "dataset open", .. }));
        assert!(err.to_string().starts_with("dataset open task failed"));
    }
}
