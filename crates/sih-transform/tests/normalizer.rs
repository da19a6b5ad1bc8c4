//! Integration tests for the field normalizer.

use polars::prelude::{Column, DataFrame, DataType, IntoColumn, NamedFrom, Series};
use proptest::prelude::*;
use sih_common::days_to_date;
use sih_transform::{FieldNormalizer, RuleSet};

fn test_df(columns: Vec<(&str, Vec<Option<&str>>)>) -> DataFrame {
    let cols: Vec<Column> = columns
        .into_iter()
        .map(|(name, values)| Series::new(name.into(), values).into_column())
        .collect();
    DataFrame::new(cols).unwrap()
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

fn admission_batch() -> DataFrame {
    test_df(vec![
        ("N_AIH", vec![Some("100"), Some("abc"), Some("200")]),
        ("VAL_SH", vec![Some("10,5"), Some("1"), Some("x")]),
        ("VAL_SP", vec![Some("20"), Some("1"), None]),
        ("VAL_UTI", vec![Some("0"), Some("1"), Some("-5")]),
        ("VAL_TOT", vec![Some("999"), Some("999"), Some("999")]),
        ("DT_INTER", vec![Some("20210110"), None, Some("20210301")]),
        ("DT_SAIDA", vec![Some("20210115"), None, Some("20210201")]),
        ("NASC", vec![Some("19800111"), None, None]),
        ("IDADE", vec![Some("41"), Some("5"), Some("24")]),
        ("COD_IDADE", vec![Some("4"), Some("4"), Some("3")]),
        ("DIAS_PERM", vec![Some("7"), None, Some("3")]),
        ("MUNIC_RES", vec![Some("530020"), Some("3550"), Some("000000")]),
        ("DIAG_PRINC", vec![Some(" j18 "), None, Some("I10")]),
        ("SEXO", vec![Some("1"), Some("3"), Some("7")]),
    ])
}

#[test]
fn test_normalize_drops_rows_with_invalid_key() {
    let normalizer = FieldNormalizer::new(RuleSet::standard());
    let batch = normalizer.normalize(&admission_batch()).unwrap();

    assert_eq!(batch.rows_in, 3);
    assert_eq!(batch.dropped_keys, 1);
    assert_eq!(batch.frame.height(), 2);
    assert_eq!(i64_at(&batch.frame, "N_AIH", 0), Some(100));
    assert_eq!(i64_at(&batch.frame, "N_AIH", 1), Some(200));
}

#[test]
fn test_normalize_types_and_cleans_fields() {
    let normalizer = FieldNormalizer::new(RuleSet::standard());
    let frame = normalizer.normalize(&admission_batch()).unwrap().frame;

    assert_eq!(frame.column("DT_INTER").unwrap().dtype(), &DataType::Date);
    assert_eq!(frame.column("VAL_SH").unwrap().dtype(), &DataType::Float64);
    assert_eq!(str_at(&frame, "MUNIC_RES", 0).as_deref(), Some("530010"));
    assert_eq!(str_at(&frame, "MUNIC_RES", 1).as_deref(), Some("0"));
    assert_eq!(str_at(&frame, "DIAG_PRINC", 0).as_deref(), Some("J180"));
    assert_eq!(i64_at(&frame, "SEXO", 1), Some(3));
    assert_eq!(f64_at(&frame, "VAL_UTI", 1), Some(0.0));
}

#[test]
fn test_normalize_recomputes_derived_fields() {
    let normalizer = FieldNormalizer::new(RuleSet::standard());
    let frame = normalizer.normalize(&admission_batch()).unwrap().frame;

    // Source VAL_TOT is ignored.
    assert_eq!(f64_at(&frame, "VAL_TOT", 0), Some(30.5));
    assert_eq!(f64_at(&frame, "VAL_TOT", 1), Some(0.0));
    assert_eq!(i64_at(&frame, "DIAS_PERM", 0), Some(5));
    // Discharge before admission clips to zero.
    assert_eq!(i64_at(&frame, "DIAS_PERM", 1), Some(0));
    // Birthday on 1980-01-11, admitted 2021-01-10: not yet 41.
    assert_eq!(i64_at(&frame, "IDADE", 0), Some(40));
    // No birth date: 24 months falls back to 2 years.
    assert_eq!(i64_at(&frame, "IDADE", 1), Some(2));
}

#[test]
fn test_normalize_reports_fallbacks_per_column() {
    let normalizer = FieldNormalizer::new(RuleSet::standard());
    let batch = normalizer.normalize(&admission_batch()).unwrap();
    let columns: Vec<&str> = batch.fallbacks.iter().map(|f| f.column.as_str()).collect();
    assert!(columns.contains(&"N_AIH"));
    assert!(columns.contains(&"VAL_SH"));
    assert!(!columns.contains(&"DIAG_PRINC"));
}

#[test]
fn test_normalize_requires_key_column() {
    let normalizer = FieldNormalizer::new(RuleSet::standard());
    let df = test_df(vec![("VAL_SH", vec![Some("1")])]);
    assert!(normalizer.normalize(&df).is_err());
}

fn compact(days: i32) -> String {
    days_to_date(days).unwrap().format("%Y%m%d").to_string()
}

proptest! {
    #[test]
    fn prop_derived_fields_hold(
        sh in 0u32..100_000,
        sp in 0u32..100_000,
        uti in 0u32..100_000,
        birth in -20_000i32..20_000,
        admit_offset in -1_000i32..60_000,
        stay in -30i32..400,
    ) {
        let admit = birth + admit_offset;
        let discharge = admit + stay;
        let sh_text = format!("{},{:02}", sh / 100, sh % 100);
        let sp_text = (sp / 100).to_string();
        let uti_text = (uti / 100).to_string();
        let birth_text = compact(birth);
        let admit_text = compact(admit);
        let discharge_text = compact(discharge);
        let df = test_df(vec![
            ("N_AIH", vec![Some("1")]),
            ("VAL_SH", vec![Some(sh_text.as_str())]),
            ("VAL_SP", vec![Some(sp_text.as_str())]),
            ("VAL_UTI", vec![Some(uti_text.as_str())]),
            ("NASC", vec![Some(birth_text.as_str())]),
            ("DT_INTER", vec![Some(admit_text.as_str())]),
            ("DT_SAIDA", vec![Some(discharge_text.as_str())]),
            ("IDADE", vec![None]),
        ]);
        let frame = FieldNormalizer::new(RuleSet::standard()).normalize(&df).unwrap().frame;

        let total = f64_at(&frame, "VAL_TOT", 0).unwrap();
        let parts = f64_at(&frame, "VAL_SH", 0).unwrap()
            + f64_at(&frame, "VAL_SP", 0).unwrap()
            + f64_at(&frame, "VAL_UTI", 0).unwrap();
        prop_assert!((total - parts).abs() < 1e-9);

        let los = i64_at(&frame, "DIAS_PERM", 0).unwrap();
        prop_assert_eq!(los, i64::from(stay.max(0)));

        let age = i64_at(&frame, "IDADE", 0).unwrap();
        prop_assert!((0..=150).contains(&age));
    }
}
