//! URL building utilities for API endpoints

use chrono::NaiveDate;

/// Builds the scheduled-events URL for one date.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use darts_fetch::data_fetcher::api::build_scheduled_events_url;
///
/// let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
/// let url = build_scheduled_events_url("https://api.example.com/api/v1", date);
/// assert_eq!(url, "https://api.example.com/api/v1/sport/darts/scheduled-events/2024-06-01");
/// ```
pub fn build_scheduled_events_url(api_base_url: &str, date: NaiveDate) -> String {
    format!(
        "{}/sport/darts/scheduled-events/{}",
        api_base_url.trim_end_matches('/'),
        date.format("%Y-%m-%d")
    )
}

/// Builds the statistics URL for one event.
///
/// # Example
/// ```
/// use darts_fetch::data_fetcher::api::build_event_statistics_url;
///
/// let url = build_event_statistics_url("https://api.example.com/api/v1", 12345);
/// assert_eq!(url, "https://api.example.com/api/v1/event/12345/statistics");
/// ```
pub fn build_event_statistics_url(api_base_url: &str, event_id: i64) -> String {
    format!(
        "{}/event/{}/statistics",
        api_base_url.trim_end_matches('/'),
        event_id
    )
}
