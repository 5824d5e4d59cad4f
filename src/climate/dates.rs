// Calendar dates as stored in the measurement table (`YYYY-MM-DD`)

use chrono::{Datelike, Days, NaiveDate};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of the trailing window ending at the latest observation
pub const TRAILING_WINDOW_DAYS: u64 = 365;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A validated observation date.
///
/// Always renders zero-padded with a four-digit year, which keeps string
/// comparison in the store chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationDate(NaiveDate);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid date '{value}': expected YYYY-MM-DD")]
pub struct DateParseError {
    pub value: String,
}

impl ObservationDate {
    pub fn new(date: NaiveDate) -> Option<Self> {
        (0..=9999).contains(&date.year()).then_some(Self(date))
    }

    /// Start of the trailing window that ends on `self`: exactly 365 days
    /// earlier, whatever leap days fall in between
    pub fn trailing_window_start(self) -> Option<Self> {
        self.0
            .checked_sub_days(Days::new(TRAILING_WINDOW_DAYS))
            .and_then(Self::new)
    }
}

impl FromStr for ObservationDate {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || DateParseError {
            value: s.to_string(),
        };
        let date = NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| error())?;
        Self::new(date).ok_or_else(error)
    }
}

impl fmt::Display for ObservationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> ObservationDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_render_canonical_form() {
        assert_eq!(date("2017-08-23").to_string(), "2017-08-23");
        assert_eq!(date("2017-8-1").to_string(), "2017-08-01");
    }

    #[test]
    fn test_rejects_malformed_dates() {
        for bad in ["", "2017", "2017-13-01", "2017-02-30", "23/08/2017", "2017-08-23x", "latest"] {
            let err = bad.parse::<ObservationDate>().unwrap_err();
            assert_eq!(err.value, bad);
        }
    }

    #[test]
    fn test_trailing_window_is_fixed_365_days() {
        assert_eq!(
            date("2017-08-23").trailing_window_start().unwrap(),
            date("2016-08-23")
        );
        // 2016 is a leap year: a fixed offset lands one day later than the calendar date
        assert_eq!(
            date("2017-02-28").trailing_window_start().unwrap(),
            date("2016-02-29")
        );
    }

    #[test]
    fn test_error_message() {
        let err = "soon".parse::<ObservationDate>().unwrap_err();
        assert_eq!(err.to_string(), "invalid date 'soon': expected YYYY-MM-DD");
    }
}
