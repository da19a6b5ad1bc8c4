//! Integration tests for key aggregation.

use std::fs;

use polars::prelude::{Column, DataFrame, IntoColumn, NamedFrom, Series};
use proptest::prelude::*;
use sih_core::{AggregateError, Aggregated, KeyAggregator, MergePolicy};
use sih_ingest::IngestError;
use sih_model::{AggregateOptions, AggregationStrategy};
use sih_standards::INPUT_COLUMNS;
use sih_transform::{FieldNormalizer, RuleSet};
use tempfile::TempDir;

fn test_df(columns: Vec<(&str, Vec<Option<&str>>)>) -> DataFrame {
    let cols: Vec<Column> = columns
        .into_iter()
        .map(|(name, values)| Series::new(name.into(), values).into_column())
        .collect();
    DataFrame::new(cols).unwrap()
}

fn aggregator(strategy: AggregationStrategy, chunk_size: usize, fan_in: usize) -> KeyAggregator {
    let rules = RuleSet::standard();
    let policy = MergePolicy::standard(&rules);
    let options = AggregateOptions::new()
        .with_strategy(strategy)
        .with_chunk_size(chunk_size)
        .with_merge_fan_in(fan_in);
    KeyAggregator::new(FieldNormalizer::new(rules), policy, options)
}

/// Splits `raw` into chunks of `size` rows, the way the chunk reader does.
fn chunks(raw: &DataFrame, size: usize) -> Vec<sih_ingest::Result<DataFrame>> {
    (0..raw.height())
        .step_by(size)
        .map(|offset| Ok(raw.slice(offset as i64, size)))
        .collect()
}

fn run(raw: &DataFrame, strategy: AggregationStrategy, chunk_size: usize) -> Aggregated {
    aggregator(strategy, chunk_size, 2)
        .aggregate_chunks(chunks(raw, chunk_size))
        .unwrap()
}

fn i64_at(df: &DataFrame, name: &str, idx: usize) -> Option<i64> {
    df.column(name).unwrap().i64().unwrap().get(idx)
}

fn f64_at(df: &DataFrame, name: &str, idx: usize) -> Option<f64> {
    df.column(name).unwrap().f64().unwrap().get(idx)
}

fn str_at(df: &DataFrame, name: &str, idx: usize) -> Option<String> {
    df.column(name)
        .unwrap()
        .str()
        .unwrap()
        .get(idx)
        .map(str::to_string)
}

fn duplicate_admissions() -> DataFrame {
    test_df(vec![
        ("N_AIH", vec![Some("100"), Some("200"), Some("100")]),
        ("VAL_SH", vec![Some("10.0"), Some("1.0"), Some("20.0")]),
        ("VAL_SP", vec![Some("0"), Some("2.0"), Some("0")]),
        ("VAL_TOT", vec![Some("1"), Some("1"), Some("1")]),
        ("UTI_MES_TO", vec![Some("4"), Some("1"), Some("6")]),
        ("CGC_HOSP", vec![Some("A"), Some("C"), Some("B")]),
        ("PROC_REA", vec![Some("303010037"), Some("1"), Some("411010034")]),
        ("DT_INTER", vec![Some("20210110"), None, Some("20210110")]),
        ("DT_SAIDA", vec![Some("20210115"), None, Some("20210120")]),
    ])
}

#[test]
fn test_duplicate_key_scenario() {
    for strategy in [AggregationStrategy::SinglePass, AggregationStrategy::Chunked] {
        let Aggregated { frame, report } = run(&duplicate_admissions(), strategy, 1);

        assert_eq!(frame.height(), 2, "{strategy}");
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.output_rows, 2);
        assert_eq!(i64_at(&frame, "N_AIH", 0), Some(100));
        assert_eq!(i64_at(&frame, "N_AIH", 1), Some(200));

        assert_eq!(f64_at(&frame, "VAL_SH", 0), Some(30.0));
        assert_eq!(f64_at(&frame, "VAL_TOT", 0), Some(30.0));
        assert_eq!(f64_at(&frame, "UTI_MES_TO", 0), Some(5.0));
        assert_eq!(str_at(&frame, "CGC_HOSP", 0).as_deref(), Some("A"));
        // Second row carries the larger total.
        assert_eq!(str_at(&frame, "PROC_REA", 0).as_deref(), Some("0411010034"));
        assert_eq!(f64_at(&frame, "VAL_TOT", 1), Some(3.0));
    }
}

#[test]
fn test_stay_length_recomputed_from_merged_dates() {
    let raw = test_df(vec![
        ("N_AIH", vec![Some("7"), Some("7")]),
        ("DT_INTER", vec![Some("20210110"), Some("20210105")]),
        ("DT_SAIDA", vec![Some("20210112"), Some("20210130")]),
        ("DIAS_PERM", vec![Some("2"), Some("25")]),
    ]);
    let Aggregated { frame, .. } = run(&raw, AggregationStrategy::SinglePass, 10);
    // Both dates are first-seen; the source DIAS_PERM values are discarded.
    assert_eq!(i64_at(&frame, "DIAS_PERM", 0), Some(2));
}

#[test]
fn test_argmax_tie_goes_to_earliest_row() {
    let raw = test_df(vec![
        ("N_AIH", vec![Some("1"), Some("1"), Some("1")]),
        ("VAL_SH", vec![Some("5"), Some("5"), Some("1")]),
        ("PROC_REA", vec![Some("1"), Some("2"), Some("3")]),
    ]);
    for strategy in [AggregationStrategy::SinglePass, AggregationStrategy::Chunked] {
        let Aggregated { frame, .. } = run(&raw, strategy, 1);
        assert_eq!(str_at(&frame, "PROC_REA", 0).as_deref(), Some("0000000001"));
    }
}

#[test]
fn test_mode_tie_goes_to_first_seen_value() {
    let raw = test_df(vec![
        ("N_AIH", vec![Some("1"), Some("1"), Some("1"), Some("1")]),
        ("CNES", vec![Some("222"), Some("111"), Some("111"), Some("222")]),
    ]);
    for strategy in [AggregationStrategy::SinglePass, AggregationStrategy::Chunked] {
        let Aggregated { frame, .. } = run(&raw, strategy, 1);
        assert_eq!(str_at(&frame, "CNES", 0).as_deref(), Some("0000222"));
    }
}

#[test]
fn test_chunked_merge_rounds() {
    let keys: Vec<String> = (0..9).map(|i| (i % 4 + 1).to_string()).collect();
    let raw = test_df(vec![(
        "N_AIH",
        keys.iter().map(|k| Some(k.as_str())).collect(),
    )]);
    let Aggregated { frame, report } = run(&raw, AggregationStrategy::Chunked, 1);
    assert_eq!(frame.height(), 4);
    assert_eq!(report.chunks, 9);
    // 9 -> 5 -> 3 -> 2 -> 1 with a fan-in of 2.
    assert_eq!(report.merge_rounds, 4);
}

#[test]
fn test_no_chunks_is_an_error() {
    let result = aggregator(AggregationStrategy::Chunked, 10, 5).aggregate_chunks(Vec::new());
    assert!(matches!(result, Err(AggregateError::NoInput)));
}

#[test]
fn test_missing_key_column_is_an_error() {
    let raw = test_df(vec![("VAL_SH", vec![Some("1")])]);
    let result = aggregator(AggregationStrategy::SinglePass, 10, 5).aggregate_chunks(chunks(&raw, 10));
    assert!(matches!(result, Err(AggregateError::Normalize(_))));
}

#[test]
fn test_aggregate_dir_merges_duplicates_across_files() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("RDSP2101.csv"),
        "N_AIH,VAL_SH,CNES\n100,10.0,1\n200,1.0,2\n",
    )
    .unwrap();
    fs::write(dir.path().join("RDSP2102.csv"), "N_AIH,VAL_SH\n100,20.0\n").unwrap();

    let Aggregated { frame, report } = aggregator(AggregationStrategy::Chunked, 1, 5)
        .aggregate_dir(dir.path(), INPUT_COLUMNS)
        .unwrap();

    assert_eq!(report.files_read, 2);
    assert_eq!(report.rows_read, 3);
    assert_eq!(frame.height(), 2);
    assert_eq!(f64_at(&frame, "VAL_SH", 0), Some(30.0));
    assert_eq!(frame.width(), INPUT_COLUMNS.len());
}

#[test]
fn test_aggregate_dir_without_inputs() {
    let dir = TempDir::new().unwrap();
    let result = aggregator(AggregationStrategy::Chunked, 10, 5).aggregate_dir(dir.path(), INPUT_COLUMNS);
    assert!(matches!(
        result,
        Err(AggregateError::Ingest(IngestError::MissingInput { .. }))
    ));
}

fn admission_rows() -> impl Strategy<Value = Vec<(u8, u16, u16, u8, u8)>> {
    prop::collection::vec((1u8..6, 0u16..500, 0u16..500, 0u8..30, 0u8..4), 1..40)
}

proptest! {
    #[test]
    fn prop_strategies_agree(rows in admission_rows(), chunk_size in 1usize..8) {
        let text = |values: Vec<String>| values.into_iter().map(Some).collect::<Vec<_>>();
        let columns: Vec<Column> = vec![
            Series::new("N_AIH".into(), text(rows.iter().map(|r| r.0.to_string()).collect())).into_column(),
            Series::new("VAL_SH".into(), text(rows.iter().map(|r| r.1.to_string()).collect())).into_column(),
            Series::new("VAL_SP".into(), text(rows.iter().map(|r| r.2.to_string()).collect())).into_column(),
            Series::new("UTI_MES_TO".into(), text(rows.iter().map(|r| r.3.to_string()).collect())).into_column(),
            Series::new("SEXO".into(), text(rows.iter().map(|r| r.4.to_string()).collect())).into_column(),
            Series::new("PROC_REA".into(), text(rows.iter().map(|r| (r.1 % 7).to_string()).collect())).into_column(),
        ];
        let raw = DataFrame::new(columns).unwrap();

        let single = run(&raw, AggregationStrategy::SinglePass, raw.height());
        let chunked = run(&raw, AggregationStrategy::Chunked, chunk_size);

        prop_assert!(single.frame.equals_missing(&chunked.frame));
        let keys = chunked.frame.column("N_AIH").unwrap().n_unique().unwrap();
        prop_assert_eq!(keys, chunked.frame.height());
        for idx in 0..chunked.frame.height() {
            let total = f64_at(&chunked.frame, "VAL_SH", idx).unwrap_or(0.0)
                + f64_at(&chunked.frame, "VAL_SP", idx).unwrap_or(0.0);
            prop_assert_eq!(f64_at(&chunked.frame, "VAL_TOT", idx), Some(total));
        }
    }
}
