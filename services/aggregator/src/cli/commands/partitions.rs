//! `partitions`: month partitions attached to a fact table.

use anyhow::Result;
use clap::Args;
use icds_aggregator::{error::AggregationError, helpers::catalog, pipeline::RunStatus};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::output::{display_option, print_output};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PartitionsCommand {
    /// Table type (e.g. agg-awc) or parent table name (e.g. agg_awc).
    table: String,
}

#[derive(Debug, Serialize, Tabled)]
struct PartitionRow {
    #[tabled(rename = "Partition")]
    name: String,

    #[tabled(rename = "From", display = "display_option")]
    from: Option<String>,

    #[tabled(rename = "To", display = "display_option")]
    to: Option<String>,
}

impl PartitionsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<RunStatus> {
        let descriptor = catalog::find(&self.table)
            .or_else(|| {
                catalog::DESCRIPTORS
                    .iter()
                    .copied()
                    .find(|d| d.target == self.table)
            })
            .ok_or_else(|| AggregationError::UnknownHelper(self.table.clone()))?;

        let db = ctx.database().await?;
        let attached = db.partitions().attached(&descriptor.target_ident()?).await?;
        let rows: Vec<PartitionRow> = attached
            .into_iter()
            .map(|p| PartitionRow {
                from: p.bounds.map(|b| b.from.to_string()),
                to: p.bounds.map(|b| b.to.to_string()),
                name: p.name,
            })
            .collect();
        print_output(&rows, ctx.format);
        Ok(RunStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabled::Table;

    #[test]
    fn test_bounds_render_unwrapped() {
        let rows = vec![
            PartitionRow {
                name: "agg_awc_201908".to_string(),
                from: Some("2019-08-01".to_string()),
                to: Some("2019-09-01".to_string()),
            },
            PartitionRow {
                name: "agg_awc_default".to_string(),
                from: None,
                to: None,
            },
        ];
        let table = Table::new(rows).to_string();
        assert!(table.contains("2019-08-01"));
        assert!(table.contains(" - "));
        assert!(!table.contains("Some("));
    }
}
