//! `migrate`: apply database migrations.

use anyhow::Result;
use clap::Args;
use icds_aggregator::pipeline::RunStatus;

use crate::cli::output::{print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct MigrateCommand {}

impl MigrateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<RunStatus> {
        let db = ctx.database().await?;
        db.health_check().await?;
        db.run_migrations().await?;
        if ctx.format == OutputFormat::Table {
            print_success("migrations applied");
        }
        Ok(RunStatus::Completed)
    }
}
