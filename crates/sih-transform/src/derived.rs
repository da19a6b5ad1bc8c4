//! Derived fields.
//!
//! Total value, length of stay and age are never trusted from the source or
//! merged across duplicates; they are recomputed from their components both
//! after normalization and after aggregation.

use polars::prelude::{
    Column, DataFrame, DataType, Float64Chunked, Int64Chunked, IntoSeries, NewChunkedArray,
    PolarsResult,
};
use serde::{Deserialize, Serialize};
use sih_common::{days_to_date, whole_years_between};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedField {
    /// Sum of the component amounts; missing components count as zero.
    Total {
        target: String,
        components: Vec<String>,
    },
    /// `discharge - admission` in days, at least 0; 0 when either is missing.
    StayLength {
        target: String,
        admission: String,
        discharge: String,
    },
    /// Completed years from `birth` to `reference`, clipped to `[0, max]`.
    /// When either date is missing the existing `target` value is kept
    /// (clipped), and null becomes 0.
    Age {
        target: String,
        birth: String,
        reference: String,
        max: i64,
    },
}

impl DerivedField {
    pub fn standard() -> Vec<Self> {
        vec![
            Self::Total {
                target: "VAL_TOT".to_string(),
                components: vec![
                    "VAL_SH".to_string(),
                    "VAL_SP".to_string(),
                    "VAL_UTI".to_string(),
                ],
            },
            Self::StayLength {
                target: "DIAS_PERM".to_string(),
                admission: "DT_INTER".to_string(),
                discharge: "DT_SAIDA".to_string(),
            },
            Self::Age {
                target: "IDADE".to_string(),
                birth: "NASC".to_string(),
                reference: "DT_INTER".to_string(),
                max: 150,
            },
        ]
    }

}

fn float_values(df: &DataFrame, name: &str, height: usize) -> PolarsResult<Vec<Option<f64>>> {
    match df.column(name) {
        Ok(column) => {
            let cast = column.cast(&DataType::Float64)?;
            Ok(cast.f64()?.into_iter().collect())
        }
        Err(_) => Ok(vec![None; height]),
    }
}

fn int_values(df: &DataFrame, name: &str, height: usize) -> PolarsResult<Vec<Option<i64>>> {
    match df.column(name) {
        Ok(column) => {
            let cast = column.cast(&DataType::Int64)?;
            Ok(cast.i64()?.into_iter().collect())
        }
        Err(_) => Ok(vec![None; height]),
    }
}

/// Day counts of a date column.
fn day_values(df: &DataFrame, name: &str, height: usize) -> PolarsResult<Vec<Option<i32>>> {
    match df.column(name) {
        Ok(column) if column.dtype() == &DataType::Date => {
            let cast = column.cast(&DataType::Int32)?;
            Ok(cast.i32()?.into_iter().collect())
        }
        _ => Ok(vec![None; height]),
    }
}

fn compute(df: &DataFrame, field: &DerivedField) -> PolarsResult<Column> {
    let height = df.height();
    let series = match field {
        DerivedField::Total { target, components } => {
            let mut totals = vec![0.0; height];
            for component in components {
                for (total, value) in totals
                    .iter_mut()
                    .zip(float_values(df, component, height)?)
                {
                    *total += value.unwrap_or(0.0);
                }
            }
            Float64Chunked::from_vec(target.as_str().into(), totals).into_series()
        }
        DerivedField::StayLength {
            target,
            admission,
            discharge,
        } => {
            let admitted = day_values(df, admission, height)?;
            let discharged = day_values(df, discharge, height)?;
            let stays: Vec<i64> = admitted
                .into_iter()
                .zip(discharged)
                .map(|pair| match pair {
                    (Some(start), Some(end)) => i64::from(end - start).max(0),
                    _ => 0,
                })
                .collect();
            Int64Chunked::from_vec(target.as_str().into(), stays).into_series()
        }
        DerivedField::Age {
            target,
            birth,
            reference,
            max,
        } => {
            let births = day_values(df, birth, height)?;
            let references = day_values(df, reference, height)?;
            let fallback = int_values(df, target, height)?;
            let ages: Vec<i64> = births
                .into_iter()
                .zip(references)
                .zip(fallback)
                .map(|((born, at), existing)| {
                    let computed = match (born.and_then(days_to_date), at.and_then(days_to_date)) {
                        (Some(born), Some(at)) => Some(whole_years_between(born, at)),
                        _ => existing,
                    };
                    computed.unwrap_or(0).clamp(0, *max)
                })
                .collect();
            Int64Chunked::from_vec(target.as_str().into(), ages).into_series()
        }
    };
    Ok(series.into())
}

/// Recomputes every derived field in place, in declaration order.
pub fn apply_derived(df: &mut DataFrame, fields: &[DerivedField]) -> PolarsResult<()> {
    for field in fields {
        let column = compute(df, field)?;
        df.with_column(column)?;
    }
    Ok(())
}
