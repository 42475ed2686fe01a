use crate::cli::{Args, resolve_dates};
use darts_fetch::config::Config;
use darts_fetch::constants::env_vars;
use darts_fetch::data_fetcher::aggregator::{OutputGrouping, aggregate, summarize};
use darts_fetch::data_fetcher::fetch_range;
use darts_fetch::error::AppError;
use tracing::info;

/// Handles configuration update commands (--set-log-file, --clear-log-file).
pub async fn handle_config_update_command(args: &Args) -> Result<(), AppError> {
    let mut config = Config::load().await.unwrap_or_default();

    if let Some(new_log_path) = &args.new_log_file_path {
        config.log_file_path = Some(new_log_path.clone());
    } else if args.clear_log_file_path {
        config.log_file_path = None;
        println!("Custom log file path cleared. Using default location.");
    }

    config.save().await?;
    println!("Config updated successfully!");

    Ok(())
}

/// Layers command line flags over the loaded configuration.
pub fn apply_args(config: &mut Config, args: &Args) -> Result<(), AppError> {
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if args.no_stats {
        config.include_statistics = false;
    }
    config.validate()
}

/// Fetches the requested dates, reports each date on stderr and writes the
/// rows as JSON. Per-date failures are reported, not returned.
pub async fn handle_fetch_command(args: &Args, config: &Config) -> Result<(), AppError> {
    let env_dates = std::env::var(env_vars::DATES).ok();
    let dates = resolve_dates(args, env_dates.as_deref())?;

    let results = fetch_range(
        config,
        dates,
        config.include_statistics,
        config.concurrency,
    )
    .await?;

    for report in summarize(&results) {
        eprintln!("{report}");
    }

    let grouping = if args.group_by_date {
        OutputGrouping::ByDate
    } else {
        OutputGrouping::Combined
    };
    let rows = aggregate(&results, grouping);
    let json = serde_json::to_string_pretty(&rows)?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, json).await?;
            info!("Wrote {} rows to {}", rows.row_count(), path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
