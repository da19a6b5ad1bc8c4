//! Delimited payload for `COPY ... FROM STDIN`.

use std::borrow::Cow;

use polars::prelude::DataFrame;
use sih_model::{Cell, CopyOptions, column_cells};

use crate::error::LoadError;

/// One encoded insert chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPayload {
    pub bytes: Vec<u8>,
    pub rows: usize,
}

/// Encodes `columns` of `frame` as CSV records without a header.
///
/// Nulls are written as the bare null sentinel. COPY only reads an unquoted
/// field as null, so a present value that equals the sentinel (or is empty)
/// is always quoted, as is any value holding the delimiter, a quote or a
/// line break.
pub fn encode_chunk(
    relation: &str,
    frame: &DataFrame,
    columns: &[String],
    options: &CopyOptions,
) -> Result<CopyPayload, LoadError> {
    let payload_error = |message: String| LoadError::Payload {
        relation: relation.to_string(),
        message,
    };
    let delimiter = u8::try_from(options.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| payload_error(format!("delimiter {:?} is not ASCII", options.delimiter)))?;

    let cells = columns
        .iter()
        .map(|name| column_cells(frame.column(name)?))
        .collect::<polars::prelude::PolarsResult<Vec<Vec<Cell>>>>()?;

    // Fields arrive already quoted where needed.
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(Vec::new());
    let mut record: Vec<String> = Vec::with_capacity(columns.len());
    for row in 0..frame.height() {
        record.clear();
        for column in &cells {
            record.push(match &column[row] {
                Cell::Null => options.null.clone(),
                cell => quote_field(&cell.render(), delimiter, &options.null).into_owned(),
            });
        }
        writer
            .write_record(&record)
            .map_err(|e| payload_error(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| payload_error(e.to_string()))?;
    Ok(CopyPayload {
        bytes,
        rows: frame.height(),
    })
}

fn quote_field<'a>(value: &'a str, delimiter: u8, null: &str) -> Cow<'a, str> {
    let needs_quotes = value.is_empty()
        || value == null
        || value
            .bytes()
            .any(|b| b == delimiter || matches!(b, b'"' | b'\n' | b'\r'));
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{DataType, IntoColumn, NamedFrom, Series};

    #[test]
    fn encodes_nulls_dates_and_quotes() {
        let frame = DataFrame::new(vec![
            Series::new("N_AIH".into(), [Some(1i64), Some(2)]).into_column(),
            Series::new("NOME".into(), [Some("Sao Paulo, SP"), None]).into_column(),
            Series::new("DT".into(), [Some(18_628i32), None])
                .cast(&DataType::Date)
                .unwrap()
                .into_column(),
        ])
        .unwrap();
        let columns = vec!["N_AIH".to_string(), "NOME".to_string(), "DT".to_string()];
        let payload = encode_chunk("t", &frame, &columns, &CopyOptions::default()).unwrap();
        assert_eq!(payload.rows, 2);
        assert_eq!(
            String::from_utf8(payload.bytes).unwrap(),
            "1,\"Sao Paulo, SP\",2021-01-01\n2,,\n"
        );
    }

    #[test]
    fn custom_delimiter_and_null() {
        let frame = DataFrame::new(vec![
            Series::new("A".into(), [Some(1.5f64), None]).into_column(),
        ])
        .unwrap();
        let options = CopyOptions::default().with_delimiter('|').with_null("NULL");
        let payload = encode_chunk("t", &frame, &["A".to_string()], &options).unwrap();
        assert_eq!(String::from_utf8(payload.bytes).unwrap(), "1.5\nNULL\n");
    }

    #[test]
    fn values_matching_the_null_sentinel_are_quoted() {
        let frame = DataFrame::new(vec![
            Series::new("NOME".into(), [Some("NULL"), None, Some("say \"hi\"")]).into_column(),
        ])
        .unwrap();
        let options = CopyOptions::default().with_null("NULL");
        let payload = encode_chunk("t", &frame, &["NOME".to_string()], &options).unwrap();
        assert_eq!(
            String::from_utf8(payload.bytes).unwrap(),
            "\"NULL\"\nNULL\n\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn empty_text_is_quoted_under_the_default_sentinel() {
        let frame = DataFrame::new(vec![
            Series::new("A".into(), [Some(1i64), Some(2)]).into_column(),
            Series::new("B".into(), [Some(""), None]).into_column(),
        ])
        .unwrap();
        let columns = vec!["A".to_string(), "B".to_string()];
        let payload = encode_chunk("t", &frame, &columns, &CopyOptions::default()).unwrap();
        assert_eq!(String::from_utf8(payload.bytes).unwrap(), "1,\"\"\n2,\n");
    }

    #[test]
    fn rejects_non_ascii_delimiter() {
        let frame = DataFrame::empty();
        let options = CopyOptions::default().with_delimiter('§');
        assert!(matches!(
            encode_chunk("t", &frame, &[], &options),
            Err(LoadError::Payload { .. })
        ));
    }
}
