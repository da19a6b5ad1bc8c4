//! Whole-column rule kernels.
//!
//! Each kernel makes one pass over a string column and builds the typed
//! output array directly; the scalar cleaners are exposed for reuse and
//! testing.

use polars::prelude::{
    DataType, Float64Chunked, Int32Chunked, Int64Chunked, IntoSeries, PolarsResult, Series,
    StringChunked,
};
use sih_common::{date_to_days, parse_compact_date, parse_i64};

use crate::rules::{CodeRule, Pad};

/// Canonical "unknown" code.
pub const CODE_SENTINEL: &str = "0";

/// A normalized column plus the number of present values that could not be
/// coerced and were replaced by the rule's default.
#[derive(Debug)]
pub struct ColumnOutcome {
    pub series: Series,
    pub fallbacks: usize,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn clean_key(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

/// Parses a decimal amount written with either `.` or `,` as the decimal
/// separator, ignoring currency symbols and thousands separators.
pub fn clean_money(value: &str) -> Option<f64> {
    let kept: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !kept.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    let last_dot = kept.rfind('.');
    let last_comma = kept.rfind(',');
    let decimal = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => Some(dot.max(comma)),
        (Some(dot), None) if kept.matches('.').count() == 1 => Some(dot),
        (None, Some(comma)) if kept.matches(',').count() == 1 => Some(comma),
        _ => None,
    };
    let mut canonical = String::with_capacity(kept.len());
    for (idx, c) in kept.char_indices() {
        match c {
            '.' | ',' if Some(idx) == decimal => canonical.push('.'),
            '.' | ',' => {}
            other => canonical.push(other),
        }
    }
    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Strips, case-folds, generalizes and pads a code. Empty and all-zero
/// values collapse to [`CODE_SENTINEL`].
pub fn clean_code(value: Option<&str>, rule: &CodeRule) -> String {
    let Some(trimmed) = present(value) else {
        return CODE_SENTINEL.to_string();
    };
    let trimmed = match trimmed.strip_suffix(".0") {
        Some(integral) if integral.bytes().all(|b| b.is_ascii_digit()) => integral,
        _ => trimmed,
    };
    if trimmed.chars().all(|c| c == '0') {
        return CODE_SENTINEL.to_string();
    }
    let mut code = if rule.uppercase {
        trimmed.to_uppercase()
    } else {
        trimmed.to_string()
    };
    if let Some(rewrite) = rule
        .generalize
        .iter()
        .find(|g| code.starts_with(g.prefix.as_str()))
    {
        code = rewrite.canonical.clone();
    }
    let len = code.chars().count();
    if len < rule.width {
        let zeros = "0".repeat(rule.width - len);
        match rule.pad {
            Pad::Left => code.insert_str(0, &zeros),
            Pad::Right => code.push_str(&zeros),
            Pad::None => {}
        }
    }
    code
}

/// Days since epoch for a `YYYYMMDD` date.
///
/// ISO `YYYY-MM-DD` is accepted too, since a parquet `Date` column renders
/// that way when an artifact is read back as text.
pub fn clean_date(value: &str) -> Option<i32> {
    let trimmed = value.trim();
    let date = if trimmed.len() == 10 && trimmed.as_bytes()[4] == b'-' {
        chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
    } else {
        parse_compact_date(trimmed)
    };
    date.map(date_to_days)
}

/// Converts an age in the given unit to whole years.
pub fn age_in_years(value: i64, unit: Option<i64>) -> i64 {
    match unit {
        Some(1) => 0,
        Some(2) => value / 365,
        Some(3) => value / 12,
        _ => value,
    }
}

pub fn key_column(name: &str, ca: &StringChunked) -> ColumnOutcome {
    let mut fallbacks = 0;
    let out: Int64Chunked = ca
        .into_iter()
        .map(|value| {
            let raw = present(value)?;
            let key = clean_key(raw);
            if key.is_none() {
                fallbacks += 1;
            }
            key
        })
        .collect();
    ColumnOutcome {
        series: out.with_name(name.into()).into_series(),
        fallbacks,
    }
}

pub fn count_column(
    name: &str,
    ca: &StringChunked,
    min: i64,
    max: Option<i64>,
    default: i64,
) -> ColumnOutcome {
    let mut fallbacks = 0;
    let out: Int64Chunked = ca
        .into_iter()
        .map(|value| {
            let parsed = match present(value) {
                Some(raw) => parse_i64(raw).unwrap_or_else(|| {
                    fallbacks += 1;
                    default
                }),
                None => default,
            };
            let clipped = parsed.max(min);
            Some(max.map_or(clipped, |max| clipped.min(max)))
        })
        .collect();
    ColumnOutcome {
        series: out.with_name(name.into()).into_series(),
        fallbacks,
    }
}

pub fn money_column(name: &str, ca: &StringChunked) -> ColumnOutcome {
    let mut fallbacks = 0;
    let out: Float64Chunked = ca
        .into_iter()
        .map(|value| {
            let amount = match present(value) {
                Some(raw) => clean_money(raw).unwrap_or_else(|| {
                    fallbacks += 1;
                    0.0
                }),
                None => 0.0,
            };
            Some(amount.max(0.0))
        })
        .collect();
    ColumnOutcome {
        series: out.with_name(name.into()).into_series(),
        fallbacks,
    }
}

pub fn code_column(name: &str, ca: &StringChunked, rule: &CodeRule) -> ColumnOutcome {
    let out: StringChunked = ca
        .into_iter()
        .map(|value| Some(clean_code(value, rule)))
        .collect();
    ColumnOutcome {
        series: out.with_name(name.into()).into_series(),
        fallbacks: 0,
    }
}

pub fn date_column(name: &str, ca: &StringChunked) -> PolarsResult<ColumnOutcome> {
    let mut fallbacks = 0;
    let days: Int32Chunked = ca
        .into_iter()
        .map(|value| {
            let raw = present(value)?;
            let parsed = clean_date(raw);
            if parsed.is_none() {
                fallbacks += 1;
            }
            parsed
        })
        .collect();
    Ok(ColumnOutcome {
        series: days
            .with_name(name.into())
            .into_series()
            .cast(&DataType::Date)?,
        fallbacks,
    })
}

pub fn age_column(name: &str, ca: &StringChunked, units: &StringChunked, max: i64) -> ColumnOutcome {
    let mut fallbacks = 0;
    let out: Int64Chunked = ca
        .into_iter()
        .zip(units)
        .map(|(value, unit)| {
            let raw = present(value)?;
            let Some(amount) = parse_i64(raw) else {
                fallbacks += 1;
                return None;
            };
            let unit = present(unit).and_then(parse_i64);
            Some(age_in_years(amount, unit).clamp(0, max))
        })
        .collect();
    ColumnOutcome {
        series: out.with_name(name.into()).into_series(),
        fallbacks,
    }
}

pub fn text_column(name: &str, ca: &StringChunked) -> ColumnOutcome {
    let out: StringChunked = ca.into_iter().map(present).collect();
    ColumnOutcome {
        series: out.with_name(name.into()).into_series(),
        fallbacks: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::NewChunkedArray;

    #[test]
    fn test_clean_money_locales() {
        assert_eq!(clean_money("12,50"), Some(12.5));
        assert_eq!(clean_money("1.234,56"), Some(1234.56));
        assert_eq!(clean_money("1,234.56"), Some(1234.56));
        assert_eq!(clean_money("R$ 10.00"), Some(10.0));
        assert_eq!(clean_money("1.234.567"), Some(1_234_567.0));
        assert_eq!(clean_money("abc"), None);
    }

    #[test]
    fn test_clean_code_sentinel_and_padding() {
        let diag = CodeRule::right(4);
        assert_eq!(clean_code(Some(" a01 "), &diag), "A010");
        assert_eq!(clean_code(Some("0000"), &diag), "0");
        assert_eq!(clean_code(Some("   "), &diag), "0");
        assert_eq!(clean_code(None, &diag), "0");

        let proc_rule = CodeRule::left(10);
        assert_eq!(clean_code(Some("301010072"), &proc_rule), "0301010072");
        assert_eq!(clean_code(Some("301010072.0"), &proc_rule), "0301010072");
    }

    #[test]
    fn test_clean_code_generalization() {
        let munic = CodeRule::left(6).generalizing("53", "530010");
        assert_eq!(clean_code(Some("530020"), &munic), "530010");
        assert_eq!(clean_code(Some("5300"), &munic), "530010");
        assert_eq!(clean_code(Some("3550"), &munic), "003550");
        assert_eq!(clean_code(Some("355030"), &munic), "355030");
    }

    #[test]
    fn test_clean_key_requires_digits() {
        assert_eq!(clean_key(" 4121100000015 "), Some(4_121_100_000_015));
        assert_eq!(clean_key("12A"), None);
        assert_eq!(clean_key("-1"), None);
    }

    #[test]
    fn test_age_units() {
        assert_eq!(age_in_years(20, Some(1)), 0);
        assert_eq!(age_in_years(730, Some(2)), 2);
        assert_eq!(age_in_years(30, Some(3)), 2);
        assert_eq!(age_in_years(45, Some(4)), 45);
        assert_eq!(age_in_years(45, None), 45);
    }

    #[test]
    fn test_count_column_defaults_and_clips() {
        let ca = StringChunked::from_slice_options(
            "SEXO".into(),
            &[Some("1"), Some("x"), None, Some("9"), Some("-2")],
        );
        let outcome = count_column("SEXO", &ca, 0, Some(3), 0);
        let values: Vec<Option<i64>> = outcome.series.i64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1), Some(0), Some(0), Some(3), Some(0)]);
        assert_eq!(outcome.fallbacks, 1);
    }

    #[test]
    fn test_date_column_nulls_unparseable() {
        let ca = StringChunked::from_slice_options(
            "DT_INTER".into(),
            &[Some("20210102"), Some("2021"), None],
        );
        let outcome = date_column("DT_INTER", &ca).unwrap();
        assert_eq!(outcome.series.dtype(), &DataType::Date);
        assert_eq!(outcome.series.null_count(), 2);
        assert_eq!(outcome.fallbacks, 1);
    }

    #[test]
    fn test_clean_date_accepts_compact_and_iso() {
        assert_eq!(clean_date("19700102"), Some(1));
        assert_eq!(clean_date("1970-01-02"), Some(1));
        assert_eq!(clean_date("2021-13-01"), None);
        assert_eq!(clean_date("1970/01/02"), None);
    }
}
