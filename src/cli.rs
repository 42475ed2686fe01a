use chrono::NaiveDate;
use clap::Parser;
use clap::builder::styling::{AnsiColor, Effects, Styles};
use darts_fetch::data_fetcher::api::{date_range, parse_date, parse_date_list};
use darts_fetch::data_fetcher::transport::TransportChain;
use darts_fetch::error::AppError;
use std::path::PathBuf;

fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
        .usage(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Yellow.on_default())
        .error(AnsiColor::Red.on_default().effects(Effects::BOLD))
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Red.on_default())
}

/// Returns true when the invocation only edits or shows configuration.
pub fn is_config_command(args: &Args) -> bool {
    args.list_config || args.new_log_file_path.is_some() || args.clear_log_file_path
}

/// Darts schedule and statistics fetcher
///
/// Fetches scheduled darts matches for the given dates, optionally with
/// per-match statistics, and writes the rows as JSON.
///
/// Requests go through a session bootstrap and an escalating chain of
/// transports (direct HTTP, headless browser, curl) with retry and backoff.
/// A date that keeps failing is reported and skipped; the other dates are
/// still written.
#[derive(Parser, Debug)]
#[command(about, version, long_about = None)]
#[command(styles = get_styles())]
pub struct Args {
    /// Date to fetch in YYYY-MM-DD format. Can be given several times.
    #[arg(long = "date", short = 'd', value_name = "YYYY-MM-DD", help_heading = "Dates")]
    pub dates: Vec<String>,

    /// First day of an inclusive date range.
    #[arg(long = "from", value_name = "YYYY-MM-DD", help_heading = "Dates")]
    pub from: Option<String>,

    /// Last day of an inclusive date range. Defaults to --from.
    #[arg(long = "to", value_name = "YYYY-MM-DD", requires = "from", help_heading = "Dates")]
    pub to: Option<String>,

    /// Skip per-match statistics.
    #[arg(long = "no-stats", help_heading = "Fetching")]
    pub no_stats: bool,

    /// Number of dates fetched at the same time.
    #[arg(long = "concurrency", short = 'j', help_heading = "Fetching")]
    pub concurrency: Option<usize>,

    /// Transport chain: direct-only, direct-then-rendered or shelled.
    #[arg(long = "transport", short = 't', help_heading = "Fetching")]
    pub transport: Option<TransportChain>,

    /// Write rows grouped by date instead of one combined list.
    #[arg(long = "group-by-date", help_heading = "Output")]
    pub group_by_date: bool,

    /// Write JSON to this file instead of stdout.
    #[arg(long = "output", short = 'o', help_heading = "Output")]
    pub output: Option<PathBuf>,

    /// Log only to the log file.
    #[arg(long = "quiet", short = 'q', help_heading = "Output")]
    pub quiet: bool,

    /// Update log file path in config. This sets a persistent custom log file location.
    #[arg(long = "set-log-file", help_heading = "Configuration")]
    pub new_log_file_path: Option<String>,

    /// Clear the custom log file path from config. This reverts to using the default log location.
    #[arg(long = "clear-log-file", help_heading = "Configuration")]
    pub clear_log_file_path: bool,

    /// List current configuration settings
    #[arg(long = "list-config", short = 'l', help_heading = "Configuration")]
    pub list_config: bool,

    /// Specify a custom log file path. If not provided, logs will be written to the default location.
    #[arg(long = "log-file", help_heading = "Debug")]
    pub log_file: Option<String>,
}

/// Collects the target dates from `--date`, `--from`/`--to` and, when
/// neither is given, the comma separated `env_dates`.
pub fn resolve_dates(args: &Args, env_dates: Option<&str>) -> Result<Vec<NaiveDate>, AppError> {
    let mut dates = args
        .dates
        .iter()
        .map(|d| parse_date(d))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(from) = &args.from {
        let start = parse_date(from)?;
        let end = match &args.to {
            Some(to) => parse_date(to)?,
            None => start,
        };
        dates.extend(date_range(start, end)?);
    }

    if dates.is_empty()
        && let Some(env_dates) = env_dates
    {
        dates = parse_date_list(env_dates)?;
    }

    if dates.is_empty() {
        return Err(AppError::config_error(
            "no dates given, use --date, --from/--to or DARTS_DATES",
        ));
    }
    Ok(dates)
}
