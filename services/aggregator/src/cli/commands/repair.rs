//! `repair`: targeted field repairs over built months.

use anyhow::{bail, Result};
use clap::Args;
use icds_aggregator::{
    backfill::{FieldRepair, FieldRepairer},
    pipeline::{RunStatus, StateDirectory},
};
use icds_partition::Month;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::output::{print_output, print_success, OutputFormat};

use super::{explicit_states, CommandContext};

#[derive(Debug, Args)]
pub struct RepairCommand {
    /// Repair to apply (thr-rations).
    fix: FieldRepair,

    /// First month, inclusive.
    #[arg(long)]
    from: Month,

    /// Last month, inclusive.
    #[arg(long)]
    to: Month,

    /// Limit the repair to this state. Repeatable.
    #[arg(long = "state")]
    states: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct RepairRow {
    #[tabled(rename = "Month")]
    month: String,

    #[tabled(rename = "States")]
    states: usize,

    #[tabled(rename = "Rows updated")]
    rows_updated: u64,
}

impl RepairCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<RunStatus> {
        if self.to < self.from {
            bail!("--to ({}) is before --from ({})", self.to, self.from);
        }
        let db = ctx.database().await?;
        let sources = ctx.config.source_resolver()?;
        let directory = StateDirectory::new(db.pool().clone(), &sources)?;
        let outcomes = FieldRepairer::new(db.pool().clone())
            .repair(
                self.fix,
                self.from,
                self.to,
                &directory,
                explicit_states(self.states),
            )
            .await?;

        let rows: Vec<RepairRow> = outcomes
            .iter()
            .map(|o| RepairRow {
                month: o.month.to_string(),
                states: o.states,
                rows_updated: o.rows_updated,
            })
            .collect();
        print_output(&rows, ctx.format);
        if ctx.format == OutputFormat::Table {
            print_success(&format!("{} applied to {} month(s)", self.fix, rows.len()));
        }
        Ok(RunStatus::Completed)
    }
}
