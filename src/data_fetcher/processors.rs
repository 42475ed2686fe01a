//! Pure transforms from API payloads to [`EventRow`]s.

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::data_fetcher::models::{
    EventRow, ScheduledEvent, ScheduledEventsResponse, StatisticsResponse,
};
use crate::error::{StatisticsUnavailable, TransportError};

/// Parses a scheduled-events payload into rows tagged with `date`.
///
/// Deterministic: the same payload always yields the same rows in payload order.
/// An entry that does not parse as an event is skipped with a warning; only a
/// payload whose `events` is not a list fails the whole date.
pub fn parse_event_rows(payload: &Value, date: NaiveDate) -> Result<Vec<EventRow>, TransportError> {
    let response = ScheduledEventsResponse::deserialize(payload)
        .map_err(|e| TransportError::Parse(format!("scheduled events: {e}")))?;

    let mut rows = Vec::with_capacity(response.events.len());
    for (index, entry) in response.events.iter().enumerate() {
        match ScheduledEvent::deserialize(entry) {
            Ok(event) => rows.push(event_row(&event, date)),
            Err(e) => warn!(
                "Skipping event #{index} for {date} (id {}): {e}",
                entry.get("id").unwrap_or(&serde_json::Value::Null)
            ),
        }
    }
    debug!("Parsed {} of {} events for {}", rows.len(), response.events.len(), date);
    Ok(rows)
}

fn event_row(event: &ScheduledEvent, date: NaiveDate) -> EventRow {
    EventRow {
        event_date: date,
        id: event.id,
        slug: event.slug.clone(),
        start_timestamp: event.start_timestamp,
        start_time: event.start_timestamp.and_then(format_start_time),
        home_team: event.home_name().map(str::to_string),
        away_team: event.away_name().map(str::to_string),
        home_score: event.home_score.as_ref().and_then(|s| s.display),
        away_score: event.away_score.as_ref().and_then(|s| s.display),
        tournament: event.tournament.as_ref().and_then(|t| t.name.clone()),
        round: event.round_info.as_ref().and_then(|r| r.name.clone()),
        status: event.status_text(),
        best_of_sets: event.best_of_sets,
        best_of_legs: event.best_of_legs,
        winner_code: event.winner_code,
        statistics: BTreeMap::new(),
    }
}

/// Formats a unix timestamp as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_start_time(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Flattens the `ALL` period of a statistics payload into `{key}_home` /
/// `{key}_away` pairs. Items without a key are skipped; a key repeated across
/// groups keeps the last value seen.
pub fn statistics_pairs(
    event_id: i64,
    payload: &Value,
) -> Result<BTreeMap<String, Value>, StatisticsUnavailable> {
    let response = StatisticsResponse::deserialize(payload).map_err(|e| StatisticsUnavailable {
        event_id,
        reason: format!("malformed payload: {e}"),
    })?;

    let mut pairs = BTreeMap::new();
    let mut saw_all_period = false;
    for period in response.all_periods() {
        saw_all_period = true;
        for item in period.groups.iter().flat_map(|g| g.statistics_items.iter()) {
            let Some(key) = item.key.as_deref() else {
                continue;
            };
            pairs.insert(format!("{key}_home"), item.home.clone());
            pairs.insert(format!("{key}_away"), item.away.clone());
        }
    }

    if !saw_all_period {
        return Err(StatisticsUnavailable {
            event_id,
            reason: "no ALL period in payload".to_string(),
        });
    }

    Ok(pairs)
}

/// Merges statistic pairs into a row, overwriting earlier values on key collision.
pub fn merge_statistics(row: &mut EventRow, pairs: BTreeMap<String, Value>) {
    row.statistics.extend(pairs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn schedule_payload() -> Value {
        json!({
            "events": [
                {
                    "id": 100,
                    "slug": "a-b",
                    "startTimestamp": 1717257600,
                    "homeTeam": {"name": "Player A"},
                    "awayTeam": {"name": "Player B"},
                    "tournament": {"name": "World Series"},
                    "roundInfo": {"name": "Quarterfinals"},
                    "status": {"description": "Ended"},
                    "homeScore": {"display": 6},
                    "awayScore": {"display": 4},
                    "bestOfLegs": 11,
                    "winnerCode": 1
                },
                {"id": 101}
            ]
        })
    }

    #[test]
    fn test_parse_event_rows() {
        let rows = parse_event_rows(&schedule_payload(), date()).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.id, 100);
        assert_eq!(first.event_date, date());
        assert_eq!(first.start_time.as_deref(), Some("2024-06-01 16:00:00"));
        assert_eq!(first.home_team.as_deref(), Some("Player A"));
        assert_eq!(first.round.as_deref(), Some("Quarterfinals"));
        assert_eq!(first.home_score, Some(6));
        assert_eq!(first.winner_code, Some(1));
        assert_eq!(first.status, "Ended");

        assert_eq!(rows[1].status, "scheduled");
        assert_eq!(rows[1].start_time, None);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let payload = schedule_payload();
        let first = parse_event_rows(&payload, date()).unwrap();
        let second = parse_event_rows(&payload, date()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_entries_skipped_others_kept() {
        let payload = json!({
            "events": [
                {"id": 1, "homeTeam": {"name": "Player A"}},
                {"slug": "no-id"},
                {"id": 2, "homeScore": {"display": "3"}},
                "not an object",
                {"id": 3}
            ]
        });

        let rows = parse_event_rows(&payload, date()).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(rows[0].home_team.as_deref(), Some("Player A"));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let result = parse_event_rows(&json!({"events": "nope"}), date());
        assert!(matches!(result, Err(TransportError::Parse(_))));
    }

    #[test]
    fn test_statistics_merge_uses_all_period_only() {
        let payload = json!({
            "statistics": [
                {
                    "period": "1ST",
                    "groups": [{"statisticsItems": [{"key": "Thrown180", "home": 9, "away": 9}]}]
                },
                {
                    "period": "ALL",
                    "groups": [{"statisticsItems": [{"key": "Thrown180", "home": 3, "away": 1}]}]
                }
            ]
        });

        let mut rows = parse_event_rows(&schedule_payload(), date()).unwrap();
        let pairs = statistics_pairs(100, &payload).unwrap();
        merge_statistics(&mut rows[0], pairs);

        assert_eq!(rows[0].statistics["Thrown180_home"], json!(3));
        assert_eq!(rows[0].statistics["Thrown180_away"], json!(1));
        assert_eq!(rows[0].statistics.len(), 2);
    }

    #[test]
    fn test_statistics_key_collision_last_write_wins() {
        let payload = json!({
            "statistics": [{
                "period": "ALL",
                "groups": [
                    {"statisticsItems": [{"key": "Average3Darts", "home": "90.1", "away": "88.0"}]},
                    {"statisticsItems": [
                        {"key": "Average3Darts", "home": "91.5", "away": "87.2"},
                        {"name": "No key", "home": 1, "away": 2}
                    ]}
                ]
            }]
        });

        let pairs = statistics_pairs(100, &payload).unwrap();
        assert_eq!(pairs["Average3Darts_home"], json!("91.5"));
        assert_eq!(pairs["Average3Darts_away"], json!("87.2"));
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_statistics_without_all_period_unavailable() {
        let payload = json!({"statistics": [{"period": "1ST", "groups": []}]});
        let err = statistics_pairs(42, &payload).unwrap_err();
        assert_eq!(err.event_id, 42);
    }

    #[test]
    fn test_statistics_malformed_payload_unavailable() {
        let err = statistics_pairs(42, &json!({"statistics": 5})).unwrap_err();
        assert!(err.reason.starts_with("malformed payload"));
    }
}
