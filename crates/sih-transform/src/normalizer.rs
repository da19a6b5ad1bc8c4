//! Field normalizer.
//!
//! Applies a [`RuleSet`] to a raw chunk: every column is coerced by its rule,
//! derived fields are recomputed, and rows whose business key is null are
//! dropped. Field-level coercion failures never abort the chunk.

use std::collections::BTreeMap;

use polars::prelude::{Column, DataFrame, DataType, IntoColumn, StringChunked};
use tracing::{debug, warn};

use crate::derived::apply_derived;
use crate::error::{NormalizeError, Result};
use crate::kernels::{
    ColumnOutcome, age_column, code_column, count_column, date_column, key_column, money_column,
    text_column,
};
use crate::rules::{FieldRule, RuleSet};

/// Present values of one column that could not be coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFallback {
    pub column: String,
    pub count: usize,
}

#[derive(Debug)]
pub struct NormalizedBatch {
    pub frame: DataFrame,
    pub rows_in: usize,
    /// Rows dropped because the business key was null after normalization.
    pub dropped_keys: usize,
    pub fallbacks: Vec<CoercionFallback>,
}

#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    rules: RuleSet,
}

impl FieldNormalizer {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn normalize(&self, raw: &DataFrame) -> Result<NormalizedBatch> {
        if raw.column(&self.rules.key).is_err() {
            return Err(NormalizeError::MissingKeyColumn {
                column: self.rules.key.clone(),
            });
        }
        let rows_in = raw.height();
        let mut columns: Vec<Column> = Vec::with_capacity(raw.width());
        let mut fallbacks = Vec::new();
        for column in raw.get_columns() {
            let name = column.name().as_str();
            let text = as_text(column)?;
            let outcome = self.apply_rule(raw, name, text.str()?)?;
            if outcome.fallbacks > 0 {
                fallbacks.push(CoercionFallback {
                    column: name.to_string(),
                    count: outcome.fallbacks,
                });
            }
            columns.push(outcome.series.into_column());
        }
        let mut frame = DataFrame::new(columns)?;
        apply_derived(&mut frame, &self.rules.derived)?;

        let key = frame.column(&self.rules.key)?;
        let dropped_keys = key.null_count();
        if dropped_keys > 0 {
            let mask = key.is_not_null();
            frame = frame.filter(&mask)?;
        }

        for fallback in &fallbacks {
            warn!(
                column = %fallback.column,
                count = fallback.count,
                rule_set = %self.rules.name,
                "coercion fallback"
            );
        }
        debug!(
            rows_in,
            rows_out = frame.height(),
            dropped_keys,
            "normalized chunk"
        );
        Ok(NormalizedBatch {
            frame,
            rows_in,
            dropped_keys,
            fallbacks,
        })
    }

    fn apply_rule(&self, raw: &DataFrame, name: &str, ca: &StringChunked) -> Result<ColumnOutcome> {
        let outcome = match self.rules.rule_for(name) {
            FieldRule::Key => key_column(name, ca),
            FieldRule::Count { min, max, default } => count_column(name, ca, *min, *max, *default),
            FieldRule::Money => money_column(name, ca),
            FieldRule::Code(rule) => code_column(name, ca, rule),
            FieldRule::Date => date_column(name, ca)?,
            FieldRule::Age { unit_column, max } => {
                let units = match raw.column(unit_column) {
                    Ok(column) => as_text(column)?,
                    Err(_) => Column::full_null(
                        unit_column.as_str().into(),
                        raw.height(),
                        &DataType::String,
                    ),
                };
                age_column(name, ca, units.str()?, *max)
            }
            FieldRule::Text => text_column(name, ca),
        };
        Ok(outcome)
    }
}

fn as_text(column: &Column) -> Result<Column> {
    if column.dtype() == &DataType::String {
        Ok(column.clone())
    } else {
        Ok(column.cast(&DataType::String)?)
    }
}

/// Per-column fallback totals accumulated across chunks.
pub fn merge_fallbacks(into: &mut BTreeMap<String, usize>, batch: &[CoercionFallback]) {
    for fallback in batch {
        *into.entry(fallback.column.clone()).or_default() += fallback.count;
    }
}
