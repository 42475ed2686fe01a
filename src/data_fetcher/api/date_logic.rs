//! Target date parsing and range expansion

use chrono::NaiveDate;

use crate::error::AppError;

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| AppError::datetime_parse_error(format!("invalid date '{input}': {e}")))
}

/// Every date from `start` to `end`, both inclusive.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, AppError> {
    if end < start {
        return Err(AppError::datetime_parse_error(format!(
            "range end {end} is before start {start}"
        )));
    }
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}

/// Parses a comma separated list of dates, ignoring empty entries.
pub fn parse_date_list(input: &str) -> Result<Vec<NaiveDate>, AppError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_date)
        .collect()
}
