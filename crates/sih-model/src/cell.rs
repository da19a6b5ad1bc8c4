//! Owned scalar values.
//!
//! `Cell` is the row-level currency of the aggregator and the projector: it
//! survives a round trip through intermediate chunk artifacts (as a column
//! value or inside serialized tallies) and compares without borrowing from a
//! frame.

use polars::prelude::{AnyValue, Column, DataType, NamedFrom, PolarsResult, Series};
use serde::{Deserialize, Serialize};
use sih_common::{format_numeric, parse_f64, parse_i64};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Cell {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    /// Days since 1970-01-01.
    Date(i32),
}

impl Cell {
    pub fn from_any(value: AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => Self::Null,
            AnyValue::Boolean(b) => Self::Int(i64::from(b)),
            AnyValue::Int8(v) => Self::Int(i64::from(v)),
            AnyValue::Int16(v) => Self::Int(i64::from(v)),
            AnyValue::Int32(v) => Self::Int(i64::from(v)),
            AnyValue::Int64(v) => Self::Int(v),
            AnyValue::UInt8(v) => Self::Int(i64::from(v)),
            AnyValue::UInt16(v) => Self::Int(i64::from(v)),
            AnyValue::UInt32(v) => Self::Int(i64::from(v)),
            AnyValue::UInt64(v) => i64::try_from(v).map_or(Self::Float(v as f64), Self::Int),
            AnyValue::Float32(v) => Self::Float(f64::from(v)),
            AnyValue::Float64(v) => Self::Float(v),
            AnyValue::String(s) => Self::Text(s.to_string()),
            AnyValue::StringOwned(s) => Self::Text(s.to_string()),
            AnyValue::Date(days) => Self::Date(days),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for values meaning "unknown / not applicable": null, empty or
    /// all-zero text, and numeric zero.
    pub fn is_sentinel(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Int(v) => *v == 0,
            Self::Float(v) => *v == 0.0,
            Self::Text(s) => s.trim().chars().all(|c| c == '0'),
            Self::Date(_) => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() => Some(*v as i64),
            Self::Text(s) => parse_i64(s),
            Self::Date(days) => Some(i64::from(*days)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => parse_f64(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<i32> {
        match self {
            Self::Date(days) => Some(*days),
            _ => None,
        }
    }

    /// Text rendering; `None` for null.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            other => Some(other.render()),
        }
    }

    /// Renders the value for composite keys and delimited output.
    /// Null renders as an empty string.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format_numeric(*v),
            Self::Text(s) => s.clone(),
            Self::Date(days) => sih_common::any_to_string(AnyValue::Date(*days)),
        }
    }

    /// Adds two additive values. Null is the identity.
    pub fn add(&self, other: &Cell) -> Cell {
        match (self, other) {
            (Self::Null, rhs) => rhs.clone(),
            (lhs, Self::Null) => lhs.clone(),
            (Self::Int(a), Self::Int(b)) => Self::Int(a.saturating_add(*b)),
            (lhs, rhs) => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => Self::Float(a + b),
                (Some(a), None) => Self::Float(a),
                (None, Some(b)) => Self::Float(b),
                (None, None) => Self::Null,
            },
        }
    }
}

/// Materializes a column as owned cells.
pub fn column_cells(column: &Column) -> PolarsResult<Vec<Cell>> {
    (0..column.len())
        .map(|idx| column.get(idx).map(Cell::from_any))
        .collect()
}

/// Builds a series of the requested dtype from owned cells.
///
/// Integer dtypes other than `Int64` are built as `Int64` and cast.
pub fn cells_to_series(name: &str, cells: &[Cell], dtype: &DataType) -> PolarsResult<Series> {
    match dtype {
        DataType::Int64 => Ok(Series::new(
            name.into(),
            cells.iter().map(Cell::as_i64).collect::<Vec<_>>(),
        )),
        DataType::Float64 => Ok(Series::new(
            name.into(),
            cells.iter().map(Cell::as_f64).collect::<Vec<_>>(),
        )),
        DataType::Date => Series::new(
            name.into(),
            cells.iter().map(Cell::as_date).collect::<Vec<_>>(),
        )
        .cast(&DataType::Date),
        dtype if dtype.is_integer() => Series::new(
            name.into(),
            cells.iter().map(Cell::as_i64).collect::<Vec<_>>(),
        )
        .cast(dtype),
        dtype if dtype.is_float() => Series::new(
            name.into(),
            cells.iter().map(Cell::as_f64).collect::<Vec<_>>(),
        )
        .cast(dtype),
        _ => Ok(Series::new(
            name.into(),
            cells.iter().map(Cell::as_text).collect::<Vec<_>>(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_values() {
        assert!(Cell::Null.is_sentinel());
        assert!(Cell::Text("000".to_string()).is_sentinel());
        assert!(Cell::Text("  ".to_string()).is_sentinel());
        assert!(Cell::Int(0).is_sentinel());
        assert!(!Cell::Text("A01".to_string()).is_sentinel());
        assert!(!Cell::Int(5).is_sentinel());
    }

    #[test]
    fn add_treats_null_as_identity() {
        assert_eq!(Cell::Null.add(&Cell::Int(3)), Cell::Int(3));
        assert_eq!(Cell::Int(2).add(&Cell::Int(3)), Cell::Int(5));
        assert_eq!(Cell::Float(1.5).add(&Cell::Int(1)), Cell::Float(2.5));
        assert_eq!(Cell::Null.add(&Cell::Null), Cell::Null);
    }

    #[test]
    fn cells_round_trip_through_series() {
        let cells = vec![Cell::Date(0), Cell::Null, Cell::Date(365)];
        let series = cells_to_series("NASC", &cells, &DataType::Date).unwrap();
        assert_eq!(series.dtype(), &DataType::Date);
        let back: Vec<Cell> = (0..series.len())
            .map(|idx| Cell::from_any(series.get(idx).unwrap()))
            .collect();
        assert_eq!(back, cells);
    }

    #[test]
    fn cells_to_text_series_renders_numbers() {
        let cells = vec![Cell::Int(7), Cell::Text("A".to_string()), Cell::Null];
        let series = cells_to_series("X", &cells, &DataType::String).unwrap();
        let values: Vec<Option<&str>> = series.str().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some("7"), Some("A"), None]);
    }
}
