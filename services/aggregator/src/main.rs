//! icds-aggregate
//!
//! Operator and cron entry point for the monthly aggregation pipeline. Exit
//! codes: 0 completed, 2 partially failed, 1 failed or error.

use std::process::ExitCode;

use clap::Parser;
use icds_aggregator::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            cli::print_error(&e);
            return ExitCode::FAILURE;
        }
    };

    // Prefer RUST_LOG, fall back to ICDS_LOG_LEVEL. Logs go to stderr so
    // `--format json` output stays parseable.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    match cli.run(config).await {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            cli::print_error(&e);
            ExitCode::FAILURE
        }
    }
}
