use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response of `GET /sport/darts/scheduled-events/{date}`.
///
/// Entries stay raw so one malformed event can be skipped on its own.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScheduledEventsResponse {
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NamedEntity {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EventStatus {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub status_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EventScore {
    #[serde(default)]
    pub display: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledEvent {
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(rename = "startTimestamp", default)]
    pub start_timestamp: Option<i64>,
    #[serde(rename = "homeTeam", default)]
    pub home_team: Option<NamedEntity>,
    #[serde(rename = "awayTeam", default)]
    pub away_team: Option<NamedEntity>,
    #[serde(default)]
    pub tournament: Option<NamedEntity>,
    #[serde(rename = "roundInfo", default)]
    pub round_info: Option<NamedEntity>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(rename = "homeScore", default)]
    pub home_score: Option<EventScore>,
    #[serde(rename = "awayScore", default)]
    pub away_score: Option<EventScore>,
    #[serde(rename = "bestOfSets", default)]
    pub best_of_sets: Option<i64>,
    #[serde(rename = "bestOfLegs", default)]
    pub best_of_legs: Option<i64>,
    #[serde(rename = "winnerCode", default)]
    pub winner_code: Option<i64>,
}

impl ScheduledEvent {
    pub fn home_name(&self) -> Option<&str> {
        self.home_team.as_ref().and_then(|t| t.name.as_deref())
    }

    pub fn away_name(&self) -> Option<&str> {
        self.away_team.as_ref().and_then(|t| t.name.as_deref())
    }

    /// Human readable status: `description`, then `type`, then "scheduled".
    pub fn status_text(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.description.clone().or_else(|| s.status_type.clone()))
            .unwrap_or_else(|| "scheduled".to_string())
    }
}
