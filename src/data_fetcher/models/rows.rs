use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Normalized record for one scheduled event, ready for export.
///
/// Statistic pairs are flattened into the row as `{key}_home` / `{key}_away`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub event_date: NaiveDate,
    pub id: i64,
    pub slug: Option<String>,
    pub start_timestamp: Option<i64>,
    pub start_time: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub tournament: Option<String>,
    pub round: Option<String>,
    pub status: String,
    pub best_of_sets: Option<i64>,
    pub best_of_legs: Option<i64>,
    pub winner_code: Option<i64>,
    #[serde(flatten)]
    pub statistics: BTreeMap<String, Value>,
}

impl EventRow {
    pub fn has_statistics(&self) -> bool {
        !self.statistics.is_empty()
    }
}

/// One date's worth of work handed to the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTask {
    pub date: NaiveDate,
    pub include_stats: bool,
}

/// Outcome of one [`FetchTask`]. Present for every submitted task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchResult {
    pub date: NaiveDate,
    pub rows: Vec<EventRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResult {
    pub fn success(date: NaiveDate, rows: Vec<EventRow>) -> Self {
        FetchResult {
            date,
            rows,
            error: None,
        }
    }

    pub fn failure(date: NaiveDate, error: impl Into<String>) -> Self {
        FetchResult {
            date,
            rows: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
