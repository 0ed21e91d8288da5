//! `status`: runs recorded in the ledger.

use anyhow::Result;
use clap::Args;
use icds_aggregator::{db::RunRow, pipeline::RunStatus};
use icds_partition::Month;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use crate::cli::output::{display_option, print_info, print_output, print_single, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only runs for this month.
    #[arg(long)]
    month: Option<Month>,

    /// Maximum number of runs to list.
    #[arg(long, default_value = "20")]
    limit: i64,

    /// Show one run with its step outcomes.
    #[arg(long, conflicts_with_all = ["month", "limit"])]
    run: Option<Uuid>,
}

#[derive(Debug, Serialize, Tabled)]
struct RunTableRow {
    #[tabled(rename = "Run")]
    run_id: String,

    #[tabled(rename = "Month")]
    month: String,

    #[tabled(rename = "Helper")]
    helper: String,

    #[tabled(rename = "Status")]
    status: String,

    #[tabled(rename = "Started", display = "display_option")]
    started_at: Option<String>,

    #[tabled(rename = "Finished", display = "display_option")]
    finished_at: Option<String>,
}

impl From<&RunRow> for RunTableRow {
    fn from(run: &RunRow) -> Self {
        Self {
            run_id: run.run_id.to_string(),
            month: run.month.to_string(),
            helper: run.helper.clone(),
            status: run.status.clone(),
            started_at: run.started_at.map(|t| t.to_rfc3339()),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct StepTableRow {
    #[tabled(rename = "Helper")]
    helper: String,

    #[tabled(rename = "State", display = "display_option")]
    state_id: Option<String>,

    #[tabled(rename = "Outcome")]
    outcome: String,

    #[tabled(rename = "Rows", display = "display_option")]
    rows_written: Option<i64>,

    #[tabled(rename = "Excluded", display = "display_option")]
    excluded_rows: Option<i64>,

    #[tabled(rename = "Error", display = "display_option")]
    error: Option<String>,
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<RunStatus> {
        let db = ctx.database().await?;
        let ledger = db.ledger();

        let Some(run_id) = self.run else {
            let runs = ledger
                .recent_runs(self.month.map(|m| m.start()), self.limit)
                .await?;
            let rows: Vec<RunTableRow> = runs.iter().map(RunTableRow::from).collect();
            print_output(&rows, ctx.format);
            return Ok(RunStatus::Completed);
        };

        let run = ledger.get_run(run_id).await?;
        let steps = ledger.steps(run_id).await?;
        match ctx.format {
            OutputFormat::Json => print_single(&serde_json::json!({
                "run": run,
                "steps": steps,
            })),
            OutputFormat::Table => {
                print_info(&format!(
                    "run {} for {} ({}): {}",
                    run.run_id, run.month, run.helper, run.status
                ));
                let rows: Vec<StepTableRow> = steps
                    .into_iter()
                    .map(|s| StepTableRow {
                        helper: s.helper,
                        state_id: s.state_id,
                        outcome: s.outcome,
                        rows_written: s.rows_written,
                        excluded_rows: s.excluded_rows,
                        error: s.error,
                    })
                    .collect();
                print_output(&rows, ctx.format);
            }
        }
        Ok(RunStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabled::Table;

    #[test]
    fn test_missing_step_values_render_as_dash() {
        let row = StepTableRow {
            helper: "agg-awc".to_string(),
            state_id: None,
            outcome: "succeeded".to_string(),
            rows_written: Some(12),
            excluded_rows: None,
            error: None,
        };
        let table = Table::new(vec![row]).to_string();
        assert!(table.contains("agg-awc"));
        assert!(table.contains("12"));
        assert!(table.contains(" - "));
        assert!(!table.contains("None"));
    }

    #[test]
    fn test_unfinished_run_renders_dash_for_finish_time() {
        let row = RunTableRow {
            run_id: "r1".to_string(),
            month: "2019-08-01".to_string(),
            helper: "all".to_string(),
            status: "running".to_string(),
            started_at: Some("2019-09-02T01:00:00+00:00".to_string()),
            finished_at: None,
        };
        let table = Table::new(vec![row]).to_string();
        assert!(table.contains("2019-09-02T01:00:00+00:00"));
        assert!(table.contains(" - "));
        assert!(!table.contains("Some("));
    }
}
