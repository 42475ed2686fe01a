use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response of `GET /event/{id}/statistics`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatisticsResponse {
    #[serde(default)]
    pub statistics: Vec<StatisticsPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatisticsPeriod {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub groups: Vec<StatisticsGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatisticsGroup {
    #[serde(rename = "groupName", default)]
    pub group_name: Option<String>,
    #[serde(rename = "statisticsItems", default)]
    pub statistics_items: Vec<StatisticsItem>,
}

/// One statistic; `home`/`away` arrive as strings or numbers depending on the stat.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatisticsItem {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub home: Value,
    #[serde(default)]
    pub away: Value,
    #[serde(rename = "homeValue", default)]
    pub home_value: Option<f64>,
    #[serde(rename = "awayValue", default)]
    pub away_value: Option<f64>,
}

impl StatisticsResponse {
    /// Periods tagged `period == "ALL"`; every other period is ignored.
    pub fn all_periods(&self) -> impl Iterator<Item = &StatisticsPeriod> {
        self.statistics
            .iter()
            .filter(|p| p.period.as_deref() == Some(crate::constants::api::ALL_PERIOD))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_value_types() {
        let json = r#"{
            "statistics": [{
                "period": "ALL",
                "groups": [{
                    "groupName": "Scoring",
                    "statisticsItems": [
                        {"key": "Average3Darts", "name": "Average 3 darts", "home": "98.45", "away": "95.1", "homeValue": 98.45, "awayValue": 95.1},
                        {"key": "Thrown180", "home": 3, "away": 1}
                    ]
                }]
            }]
        }"#;

        let response: StatisticsResponse = serde_json::from_str(json).unwrap();
        let items = &response.statistics[0].groups[0].statistics_items;
        assert_eq!(items[0].home, Value::String("98.45".into()));
        assert_eq!(items[0].home_value, Some(98.45));
        assert_eq!(items[1].home, serde_json::json!(3));
        assert_eq!(items[1].away_value, None);
    }

    #[test]
    fn test_all_periods_filter() {
        let response = StatisticsResponse {
            statistics: vec![
                StatisticsPeriod {
                    period: Some("1ST".into()),
                    groups: vec![],
                },
                StatisticsPeriod {
                    period: Some("ALL".into()),
                    groups: vec![],
                },
                StatisticsPeriod {
                    period: None,
                    groups: vec![],
                },
            ],
        };
        assert_eq!(response.all_periods().count(), 1);
    }
}
