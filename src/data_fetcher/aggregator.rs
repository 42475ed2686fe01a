//! Shapes per-date results into the row collections handed to exporters.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::data_fetcher::models::{EventRow, FetchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputGrouping {
    /// All rows in date order.
    #[default]
    Combined,
    /// Rows keyed by their date.
    ByDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregatedRows {
    Combined(Vec<EventRow>),
    ByDate(BTreeMap<NaiveDate, Vec<EventRow>>),
}

impl AggregatedRows {
    pub fn row_count(&self) -> usize {
        match self {
            AggregatedRows::Combined(rows) => rows.len(),
            AggregatedRows::ByDate(map) => map.values().map(Vec::len).sum(),
        }
    }
}

/// Flattens results in date order. Failed dates contribute no rows but keep
/// their (empty) entry when grouping by date.
pub fn aggregate(
    results: &BTreeMap<NaiveDate, FetchResult>,
    grouping: OutputGrouping,
) -> AggregatedRows {
    match grouping {
        OutputGrouping::Combined => AggregatedRows::Combined(
            results
                .values()
                .flat_map(|result| result.rows.iter().cloned())
                .collect(),
        ),
        OutputGrouping::ByDate => AggregatedRows::ByDate(
            results
                .iter()
                .map(|(date, result)| (*date, result.rows.clone()))
                .collect(),
        ),
    }
}

/// One line of the user-facing batch summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateReport {
    pub date: NaiveDate,
    pub events: usize,
    pub error: Option<String>,
}

impl fmt::Display for DateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => {
                let noun = if self.events == 1 { "event" } else { "events" };
                write!(f, "{}  ok  {} {}", self.date, self.events, noun)
            }
            Some(reason) => write!(f, "{}  FAILED  {}", self.date, reason),
        }
    }
}

pub fn summarize(results: &BTreeMap<NaiveDate, FetchResult>) -> Vec<DateReport> {
    results
        .values()
        .map(|result| DateReport {
            date: result.date,
            events: result.rows.len(),
            error: result.error.clone(),
        })
        .collect()
}
