//! Day-count date helpers.
//!
//! Polars stores `Date` values as signed days since the Unix epoch; these
//! helpers convert between that representation and `chrono::NaiveDate`.

use chrono::{Datelike, NaiveDate};

const UNIX_EPOCH_FROM_CE: i32 = 719_163;

/// Converts days since 1970-01-01 to a calendar date.
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_FROM_CE)?)
}

/// Converts a calendar date to days since 1970-01-01.
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_FROM_CE
}

/// Parses a compact `YYYYMMDD` date.
///
/// Anything other than exactly eight ASCII digits forming a valid calendar
/// date yields `None`.
pub fn parse_compact_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = trimmed[0..4].parse().ok()?;
    let month: u32 = trimmed[4..6].parse().ok()?;
    let day: u32 = trimmed[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Completed years from `start` to `end`.
///
/// The year difference is reduced by one when the anniversary has not yet
/// been reached in the end year. Negative when `end` precedes `start`.
pub fn whole_years_between(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut years = i64::from(end.year() - start.year());
    if (end.month(), end.day()) < (start.month(), start.day()) {
        years -= 1;
    }
    years
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_round_trip() {
        let date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(date), 0);
        assert_eq!(days_to_date(0), Some(date));
        assert_eq!(days_to_date(-1), NaiveDate::from_ymd_opt(1969, 12, 31));
    }

    #[test]
    fn test_parse_compact_date() {
        assert_eq!(
            parse_compact_date("20210315"),
            NaiveDate::from_ymd_opt(2021, 3, 15)
        );
        assert_eq!(parse_compact_date("20210230"), None);
        assert_eq!(parse_compact_date("2021031"), None);
        assert_eq!(parse_compact_date("2021-03-1"), None);
        assert_eq!(parse_compact_date(""), None);
    }

    #[test]
    fn test_whole_years_between() {
        let birth = NaiveDate::from_ymd_opt(1980, 6, 15).unwrap();
        let before = NaiveDate::from_ymd_opt(2020, 6, 14).unwrap();
        let on = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        assert_eq!(whole_years_between(birth, before), 39);
        assert_eq!(whole_years_between(birth, on), 40);
        assert_eq!(whole_years_between(on, birth), -40);
    }
}
