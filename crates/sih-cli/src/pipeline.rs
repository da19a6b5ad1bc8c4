//! Stage entry points.
//!
//! Each stage reads its inputs from the locations in [`PipelineConfig`] and
//! writes its artifacts back there, so stages can run one at a time or in
//! sequence through [`run`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sih_core::{AggregateReport, KeyAggregator, MergePolicy, RelationResult, TableProjector};
use sih_ingest::{ArtifactWriter, ChunkReader, list_input_files, read_parquet, replace_artifact};
use sih_load::{LoadInputs, LoadReport, MemoryStore, PgStore, RelationalLoader};
use sih_standards::{INPUT_COLUMNS, SchemaRegistry};
use sih_transform::{FieldNormalizer, RuleSet, merge_fallbacks};
use tracing::{info, info_span};

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    pub files_read: usize,
    pub skipped_files: Vec<PathBuf>,
    pub rows_read: usize,
    pub rows_written: usize,
    pub dropped_keys: usize,
    pub fallbacks: BTreeMap<String, usize>,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AggregateStageReport {
    pub report: AggregateReport,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProjectReport {
    pub relations: Vec<RelationResult>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub aggregate: AggregateStageReport,
    pub project: ProjectReport,
    pub load: LoadReport,
    pub elapsed: Duration,
}

pub fn rule_set(config: &PipelineConfig) -> Result<RuleSet> {
    match &config.rule_set {
        Some(path) => RuleSet::from_toml_file(path)
            .with_context(|| format!("load rule set {}", path.display())),
        None => Ok(RuleSet::standard()),
    }
}

pub fn registry(config: &PipelineConfig) -> Result<SchemaRegistry> {
    match &config.registry {
        Some(path) => SchemaRegistry::from_toml_file(path)
            .with_context(|| format!("load registry {}", path.display())),
        None => SchemaRegistry::standard().context("load built-in registry"),
    }
}

fn input_files(config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let files = list_input_files(&config.input_dir)?;
    anyhow::ensure!(
        !files.is_empty(),
        "no input files found in {}",
        config.input_dir.display()
    );
    Ok(files)
}

/// Normalizes every input chunk and streams it into the normalized artifact.
pub fn normalize(config: &PipelineConfig) -> Result<NormalizeReport> {
    let span = info_span!("normalize");
    let _guard = span.enter();
    let normalizer = FieldNormalizer::new(rule_set(config)?);
    let mut reader = ChunkReader::raw(input_files(config)?, INPUT_COLUMNS, config.chunk_size);
    let mut report = NormalizeReport {
        output: config.normalized_path(),
        ..NormalizeReport::default()
    };
    let mut writer = ArtifactWriter::new(&report.output, config.backup_existing);
    for chunk in &mut reader {
        let batch = normalizer.normalize(&chunk?)?;
        report.dropped_keys += batch.dropped_keys;
        merge_fallbacks(&mut report.fallbacks, &batch.fallbacks);
        writer.write_batch(&batch.frame)?;
    }
    let summary = reader.into_summary();
    report.files_read = summary.files_read;
    report.rows_read = summary.rows_read;
    report.skipped_files = summary.skipped;
    anyhow::ensure!(
        report.files_read > 0,
        "no readable input in {}",
        config.input_dir.display()
    );
    report.rows_written = writer.rows();
    writer.finish()?;
    info!(
        rows = report.rows_written,
        path = %report.output.display(),
        "wrote normalized artifact"
    );
    Ok(report)
}

/// Normalizes and aggregates the input, writing the aggregated artifact.
pub fn aggregate(config: &PipelineConfig) -> Result<AggregateStageReport> {
    let rules = rule_set(config)?;
    let policy = MergePolicy::standard(&rules);
    let aggregator = KeyAggregator::new(
        FieldNormalizer::new(rules),
        policy,
        config.aggregate_options(),
    );
    let mut aggregated = aggregator.aggregate_dir(&config.input_dir, INPUT_COLUMNS)?;
    let output = config.aggregated_path();
    replace_artifact(&mut aggregated.frame, &output, config.backup_existing)?;
    info!(
        rows = aggregated.frame.height(),
        path = %output.display(),
        "wrote aggregated artifact"
    );
    Ok(AggregateStageReport {
        report: aggregated.report,
        output,
    })
}

/// Projects the aggregated artifact into one artifact per relation.
pub fn project(config: &PipelineConfig) -> Result<ProjectReport> {
    let span = info_span!("project");
    let _guard = span.enter();
    let registry = registry(config)?;
    let aggregated = read_parquet(&config.aggregated_path())?;
    let relations = TableProjector::new(&registry).project_all(
        &aggregated,
        &config.processed_dir,
        config.backup_existing,
    );
    Ok(ProjectReport { relations })
}

/// Loads every relation artifact into the configured database, or into an
/// in-memory store when `dry_run` is set.
pub async fn load(config: &PipelineConfig, dry_run: bool) -> Result<LoadReport> {
    let registry = registry(config)?;
    let inputs = LoadInputs {
        processed_dir: config.processed_dir.clone(),
        reference_dir: config.reference_dir.clone(),
    };
    let options = config.database.copy_options();
    if dry_run {
        let mut store = MemoryStore::new();
        let report = RelationalLoader::new(&mut store, &registry, options)
            .run(&inputs)
            .await?;
        return Ok(report);
    }
    let mut store = PgStore::connect(&config.database.connect_options()?)
        .await
        .map_err(sih_load::LoadError::Connect)?;
    let report = RelationalLoader::new(&mut store, &registry, options)
        .run(&inputs)
        .await?;
    store.close().await.map_err(sih_load::LoadError::Connect)?;
    Ok(report)
}

/// Aggregate, project, and load in sequence.
pub async fn run(config: &PipelineConfig, dry_run: bool) -> Result<RunReport> {
    let started = Instant::now();
    let aggregate = aggregate(config).context("aggregate")?;
    let project = project(config).context("project")?;
    let load = load(config, dry_run).await.context("load")?;
    let elapsed = started.elapsed();
    info!(elapsed_ms = elapsed.as_millis() as u64, "pipeline complete");
    Ok(RunReport {
        aggregate,
        project,
        load,
        elapsed,
    })
}
