//! CLI command definitions.

mod backfill;
mod migrate;
mod partitions;
mod plan;
mod repair;
mod run;
mod status;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use icds_aggregator::{
    config::Config,
    db::{Database, RunLedger},
    helpers::{Engine, HelperRegistry},
    pipeline::{Pipeline, RunStatus, StateDirectory},
};

use crate::cli::output::OutputFormat;

/// icds-aggregate - rebuild the ICDS dashboard fact tables month by month.
#[derive(Debug, Parser)]
#[command(name = "icds-aggregate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table, json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build one table type (or all) for a month.
    Run(run::RunCommand),

    /// Build a range of months, oldest first.
    Backfill(backfill::BackfillCommand),

    /// Apply a targeted field repair to already-built months.
    Repair(repair::RepairCommand),

    /// Print the helper execution order.
    Plan(plan::PlanCommand),

    /// Show recent runs from the ledger.
    Status(status::StatusCommand),

    /// List the month partitions attached to a fact table.
    Partitions(partitions::PartitionsCommand),

    /// Apply database migrations.
    Migrate(migrate::MigrateCommand),
}

impl Cli {
    /// Run the command. The returned status decides the exit code.
    pub async fn run(self, config: Config) -> Result<RunStatus> {
        let ctx = CommandContext {
            config,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::Backfill(cmd) => cmd.run(ctx).await,
            Commands::Repair(cmd) => cmd.run(ctx).await,
            Commands::Plan(cmd) => cmd.run(ctx),
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::Partitions(cmd) => cmd.run(ctx).await,
            Commands::Migrate(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    pub async fn database(&self) -> Result<Database> {
        Ok(Database::connect(&self.config.database).await?)
    }

    /// Pipeline over every catalog helper, recording into the ledger.
    pub fn pipeline(&self, db: &Database) -> Result<Pipeline<RunLedger>> {
        let sources = self.config.source_resolver()?;
        let states = StateDirectory::new(db.pool().clone(), &sources)?;
        let engine = Arc::new(Engine::new(
            db.pool().clone(),
            sources,
            self.config.engine_settings(),
        ));
        Ok(Pipeline::new(
            Arc::new(HelperRegistry::new(engine)?),
            Arc::new(states),
            db.ledger(),
            self.config.pipeline_settings(),
        ))
    }
}

/// `--state` given zero times means every active state.
fn explicit_states(states: Vec<String>) -> Option<Vec<String>> {
    if states.is_empty() {
        None
    } else {
        Some(states)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_parses_month_and_states() {
        let cli = Cli::try_parse_from([
            "icds-aggregate",
            "run",
            "agg-awc",
            "--month",
            "2020-08",
            "--state",
            "st1",
            "--state",
            "st2",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, "json");
        let Commands::Run(cmd) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(cmd.month.to_string(), "2020-08-01");
        assert_eq!(cmd.states, ["st1", "st2"]);
    }

    #[test]
    fn test_run_rejects_bad_month() {
        let err = Cli::try_parse_from(["icds-aggregate", "run", "all", "--month", "2020-13"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_no_states_means_all_active() {
        assert_eq!(explicit_states(Vec::new()), None);
        assert_eq!(
            explicit_states(vec!["st1".to_string()]),
            Some(vec!["st1".to_string()])
        );
    }
}
