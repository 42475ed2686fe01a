//! Resilient darts schedule and statistics fetcher
//!
//! Fetches scheduled darts matches and their per-match statistics from the
//! Sofascore API. Requests run through a cached session, an escalating chain
//! of transports and a retry controller with exponential backoff; dates are
//! fetched concurrently and a failing date never fails its siblings.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use darts_fetch::config::Config;
//! use darts_fetch::data_fetcher::{DartsFetcher, OutputGrouping, aggregate};
//! use darts_fetch::error::AppError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AppError> {
//!     let config = Config::load().await?;
//!     let fetcher = DartsFetcher::from_config(&config)?;
//!
//!     let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
//!     let dates = start.iter_days().take(2);
//!     let results = fetcher.fetch_range(dates, false, 3).await?;
//!
//!     let rows = aggregate(&results, OutputGrouping::Combined);
//!     println!("{}", serde_json::to_string_pretty(&rows)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod data_fetcher;
pub mod error;
pub mod testing_utils;

// Re-export commonly used types for convenience
pub use config::Config;
pub use data_fetcher::{DartsFetcher, EventRow, FetchResult, fetch_range};
pub use error::AppError;
