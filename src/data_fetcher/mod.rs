pub mod aggregator;
pub mod api;
pub mod browser;
pub mod models;
pub mod orchestrator;
pub mod processors;
pub mod retry;
pub mod session;
pub mod transport;

use chrono::NaiveDate;
use std::collections::BTreeMap;

pub use aggregator::{AggregatedRows, DateReport, OutputGrouping, aggregate, summarize};
pub use models::{EventRow, FetchResult, FetchTask};
pub use orchestrator::DartsFetcher;

use crate::config::Config;
use crate::error::AppError;

/// Fetches `dates` with a fetcher built from `config`.
///
/// # Example
/// ```rust,no_run
/// use darts_fetch::config::Config;
/// use darts_fetch::data_fetcher::fetch_range;
/// use chrono::NaiveDate;
///
/// # async fn run() -> Result<(), darts_fetch::error::AppError> {
/// let config = Config::load().await?;
/// let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
/// let results = fetch_range(&config, [date], true, 3).await?;
/// for (date, result) in &results {
///     println!("{date}: {} rows", result.rows.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn fetch_range(
    config: &Config,
    dates: impl IntoIterator<Item = NaiveDate>,
    include_stats: bool,
    concurrency: usize,
) -> Result<BTreeMap<NaiveDate, FetchResult>, AppError> {
    DartsFetcher::from_config(config)?
        .fetch_range(dates, include_stats, concurrency)
        .await
}
