//! `backfill`: build a range of months.

use anyhow::{bail, Result};
use clap::Args;
use icds_aggregator::{
    backfill::{backfill, BackfillReport},
    helpers::registry::HelperSelection,
    pipeline::RunStatus,
};
use icds_partition::Month;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::output::{print_info, print_output, print_single, print_warning, OutputFormat};

use super::{explicit_states, CommandContext};

#[derive(Debug, Args)]
pub struct BackfillCommand {
    /// Table type to build (see `plan`), or `all`.
    table: HelperSelection,

    /// First month, inclusive.
    #[arg(long)]
    from: Month,

    /// Last month, inclusive.
    #[arg(long)]
    to: Month,

    /// Limit state-scoped helpers to this state. Repeatable.
    #[arg(long = "state")]
    states: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct MonthRow {
    #[tabled(rename = "Month")]
    month: String,

    #[tabled(rename = "Run")]
    run_id: String,

    #[tabled(rename = "Status")]
    status: String,

    #[tabled(rename = "Excluded")]
    excluded_rows: i64,

    #[tabled(rename = "Elapsed (ms)")]
    elapsed_ms: u64,
}

impl BackfillCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<RunStatus> {
        if self.to < self.from {
            bail!("--to ({}) is before --from ({})", self.to, self.from);
        }
        let db = ctx.database().await?;
        let pipeline = ctx.pipeline(&db)?;
        let report = backfill(
            &pipeline,
            &self.table,
            self.from,
            self.to,
            explicit_states(self.states),
        )
        .await?;

        print_report(&report, ctx.format);
        Ok(report.status())
    }
}

fn print_report(report: &BackfillReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_single(report);
        return;
    }
    let rows: Vec<MonthRow> = report
        .runs
        .iter()
        .map(|run| MonthRow {
            month: run.month.to_string(),
            run_id: run.run_id.to_string(),
            status: run.status.to_string(),
            excluded_rows: run.excluded_rows(),
            elapsed_ms: run.elapsed_ms,
        })
        .collect();
    print_output(&rows, format);
    match report.stopped_at {
        Some(month) => print_warning(&format!(
            "stopped at {month}; later months were not attempted"
        )),
        None => print_info(&format!("{} month(s) built", report.runs.len())),
    }
}
