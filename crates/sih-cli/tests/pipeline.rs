//! End-to-end runs of the stage functions against a temporary layout.

use std::fs;
use std::path::Path;

use sih_cli::config::{ConfigOverrides, PipelineConfig};
use sih_cli::pipeline;
use sih_core::ProjectionOutcome;
use sih_ingest::read_parquet;
use sih_load::{ConstraintOutcome, RelationOutcome};
use sih_model::AggregationStrategy;
use tempfile::TempDir;

const RAW: &str = "\
N_AIH,CNES,VAL_SH,VAL_SP,MORTE,CID_MORTE,CONTRACEP1,NATUREZA
100,1,10.0,5.0,1,I219,01,30
100,1,20.0,0.0,0,,,30
200,2,1.0,2.0,0,,00,40
";

fn config(root: &Path, strategy: AggregationStrategy) -> PipelineConfig {
    let input = root.join("raw");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("RDSP2101.csv"), RAW).unwrap();
    let overrides = ConfigOverrides {
        input_dir: Some(input),
        interim_dir: Some(root.join("interim")),
        processed_dir: Some(root.join("processed")),
        reference_dir: Some(root.join("reference")),
        scratch_dir: Some(root.to_path_buf()),
        chunk_size: Some(2),
        strategy: Some(strategy),
        ..ConfigOverrides::default()
    };
    PipelineConfig::resolve(None, None, &overrides).unwrap()
}

fn outcome<'a>(report: &'a pipeline::ProjectReport, relation: &str) -> &'a ProjectionOutcome {
    &report
        .relations
        .iter()
        .find(|r| r.relation == relation)
        .unwrap()
        .outcome
}

#[test]
fn test_normalize_writes_every_row() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), AggregationStrategy::SinglePass);

    let report = pipeline::normalize(&config).unwrap();

    assert_eq!(report.files_read, 1);
    assert_eq!(report.rows_written, 3);
    assert_eq!(read_parquet(&report.output).unwrap().height(), 3);
}

#[test]
fn test_aggregate_and_project() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), AggregationStrategy::Chunked);

    let aggregated = pipeline::aggregate(&config).unwrap();
    assert_eq!(aggregated.report.output_rows, 2);
    assert_eq!(aggregated.report.chunks, 2);

    let projected = pipeline::project(&config).unwrap();
    assert_eq!(
        outcome(&projected, "internacoes"),
        &ProjectionOutcome::Written { rows: 2 }
    );
    assert_eq!(
        outcome(&projected, "hospital"),
        &ProjectionOutcome::Written { rows: 2 }
    );
    assert_eq!(
        outcome(&projected, "mortes"),
        &ProjectionOutcome::Written { rows: 1 }
    );
    assert_eq!(
        outcome(&projected, "contraceptivos"),
        &ProjectionOutcome::Written { rows: 1 }
    );
    assert!(projected.relations.iter().all(|r| r.relation != "cid10"));

    let internacoes = read_parquet(&config.processed_dir.join("internacoes.parquet")).unwrap();
    let totals = internacoes.column("VAL_TOT").unwrap().f64().unwrap().clone();
    assert_eq!(totals.get(0), Some(35.0));
    assert_eq!(totals.get(1), Some(3.0));
}

#[tokio::test]
async fn test_run_dry_loads_projected_relations() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), AggregationStrategy::SinglePass);

    let report = pipeline::run(&config, true).await.unwrap();

    let load = &report.load;
    let loaded = |name: &str| {
        load.relations
            .iter()
            .find(|r| r.relation == name)
            .map(|r| r.outcome.clone())
            .unwrap()
    };
    assert!(matches!(loaded("internacoes"), RelationOutcome::Loaded { rows: 2, .. }));
    assert!(matches!(loaded("cid10"), RelationOutcome::Skipped { .. }));
    assert_eq!(load.rows_loaded(), 2 + 2 + 1 + 1);

    let fk = load
        .constraints
        .iter()
        .find(|c| c.name == "fk_internacoes_cnes")
        .unwrap();
    assert_eq!(fk.outcome, ConstraintOutcome::Added);
    let dangling = load
        .constraints
        .iter()
        .find(|c| c.name == "fk_mortes_cid_morte")
        .unwrap();
    assert!(matches!(dangling.outcome, ConstraintOutcome::Failed { .. }));
}

#[test]
fn test_aggregate_without_input_fails() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), AggregationStrategy::SinglePass);
    fs::remove_file(config.input_dir.join("RDSP2101.csv")).unwrap();

    assert!(pipeline::aggregate(&config).is_err());
}
