//! Shared utilities for SIH pipeline crates.
//!
//! Polars `AnyValue` conversions, numeric formatting, and the day-count date
//! arithmetic used by the normalizer, the aggregator, and the loader.

pub mod dates;
pub mod polars;

pub use dates::{date_to_days, days_to_date, parse_compact_date, whole_years_between};
pub use polars::{any_to_string, format_numeric, parse_f64, parse_i64, round_to};
