//! Column superset conformance.

use polars::prelude::{Column, DataFrame, DataType, IntoColumn, Series};

use crate::error::Result;

/// Narrows `df` to `columns`, in that order, as string columns.
///
/// Columns the frame lacks are backfilled with nulls; columns outside the
/// superset are dropped. Returns the conformed frame and the names that were
/// backfilled.
pub fn conform_to_columns(df: &DataFrame, columns: &[&str]) -> Result<(DataFrame, Vec<String>)> {
    let height = df.height();
    let mut backfilled = Vec::new();
    let mut conformed: Vec<Column> = Vec::with_capacity(columns.len());
    for &name in columns {
        match df.column(name) {
            Ok(column) => {
                let as_text = if column.dtype() == &DataType::String {
                    column.clone()
                } else {
                    column.cast(&DataType::String)?
                };
                conformed.push(as_text);
            }
            Err(_) => {
                backfilled.push(name.to_string());
                conformed
                    .push(Series::full_null(name.into(), height, &DataType::String).into_column());
            }
        }
    }
    Ok((DataFrame::new(conformed)?, backfilled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::NamedFrom;

    #[test]
    fn backfills_and_orders_columns() {
        let df = DataFrame::new(vec![
            Series::new("EXTRA".into(), &["x"]).into_column(),
            Series::new("VAL_SH".into(), &[10i64]).into_column(),
            Series::new("N_AIH".into(), &["1"]).into_column(),
        ])
        .unwrap();
        let (conformed, backfilled) =
            conform_to_columns(&df, &["N_AIH", "VAL_SH", "CNES"]).unwrap();
        let names: Vec<String> = conformed
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["N_AIH", "VAL_SH", "CNES"]);
        assert_eq!(backfilled, vec!["CNES".to_string()]);
        assert_eq!(conformed.column("VAL_SH").unwrap().dtype(), &DataType::String);
        assert_eq!(conformed.column("CNES").unwrap().null_count(), 1);
    }
}
