// src/main.rs
mod cli;
mod commands;
mod logging;

use clap::Parser;
use cli::{Args, is_config_command};
use darts_fetch::config::Config;
use darts_fetch::error::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();

    let loaded = Config::load().await;
    let (log_file_path, _guard) = logging::setup_logging(&args, loaded.as_ref().ok()).await?;
    tracing::info!("Logs are being written to: {log_file_path}");

    if args.list_config {
        return Config::display().await;
    }

    if is_config_command(&args) {
        return commands::handle_config_update_command(&args).await;
    }

    let mut config = loaded?;
    commands::apply_args(&mut config, &args)?;

    commands::handle_fetch_command(&args, &config).await
}
