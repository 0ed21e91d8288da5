//! `run`: build one month.

use anyhow::Result;
use clap::Args;
use icds_aggregator::{
    helpers::registry::HelperSelection,
    pipeline::{HelperSummary, RunRequest, RunStatus, RunSummary},
};
use icds_partition::Month;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::output::{
    print_info, print_output, print_single, print_warning, status_label, OutputFormat,
};

use super::{explicit_states, CommandContext};

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Table type to build (see `plan`), or `all`.
    pub(super) table: HelperSelection,

    /// Month to build, YYYY-MM or any day of it.
    #[arg(long)]
    pub(super) month: Month,

    /// Limit state-scoped helpers to this state. Repeatable.
    #[arg(long = "state")]
    pub(super) states: Vec<String>,
}

impl RunCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<RunStatus> {
        let db = ctx.database().await?;
        let pipeline = ctx.pipeline(&db)?;
        let summary = pipeline
            .run(&RunRequest {
                month: self.month,
                selection: self.table,
                states: explicit_states(self.states),
            })
            .await?;
        print_summary(&summary, ctx.format);
        Ok(summary.status)
    }
}

#[derive(Debug, Serialize, Tabled)]
pub(super) struct HelperRow {
    #[tabled(rename = "Helper")]
    helper: String,

    #[tabled(rename = "Scope")]
    scope: &'static str,

    #[tabled(rename = "OK")]
    succeeded: usize,

    #[tabled(rename = "Failed")]
    failed: usize,

    #[tabled(rename = "Skipped")]
    skipped: usize,

    #[tabled(rename = "Rows")]
    rows_written: u64,

    #[tabled(rename = "Excluded")]
    excluded_rows: i64,
}

impl From<&HelperSummary> for HelperRow {
    fn from(summary: &HelperSummary) -> Self {
        Self {
            helper: summary.helper.clone(),
            scope: summary.scope.map(|s| s.as_str()).unwrap_or("-"),
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
            rows_written: summary.rows_written,
            excluded_rows: summary.excluded_rows,
        }
    }
}

/// Headline, per-helper table, then warnings and errors.
pub(super) fn print_summary(summary: &RunSummary, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_single(summary);
        return;
    }

    print_info(&format!(
        "run {} for {}: {} in {} ms",
        summary.run_id,
        summary.month,
        status_label(summary.status),
        summary.elapsed_ms
    ));
    let rows: Vec<HelperRow> = summary.helpers.iter().map(HelperRow::from).collect();
    print_output(&rows, format);

    for helper in &summary.helpers {
        for warning in &helper.warnings {
            print_warning(&format!("{}: {warning}", helper.helper));
        }
        for error in &helper.errors {
            eprintln!("{}: {error}", helper.helper);
        }
    }
}
