//! `plan`: helper execution order.

use anyhow::Result;
use clap::Args;
use icds_aggregator::{
    helpers::{catalog, registry::plan_order, HelperDescriptor},
    pipeline::RunStatus,
};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::output::print_output;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PlanCommand {}

#[derive(Debug, Serialize, Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    position: usize,

    #[tabled(rename = "Table type")]
    key: &'static str,

    #[tabled(rename = "Target")]
    target: &'static str,

    #[tabled(rename = "Scope")]
    scope: &'static str,

    #[tabled(rename = "Depends on")]
    depends_on: String,
}

impl PlanCommand {
    pub fn run(self, ctx: CommandContext) -> Result<RunStatus> {
        let descriptors: Vec<&HelperDescriptor> = catalog::DESCRIPTORS.to_vec();
        let rows: Vec<PlanRow> = plan_order(&descriptors)?
            .into_iter()
            .enumerate()
            .map(|(position, i)| {
                let d = descriptors[i];
                PlanRow {
                    position: position + 1,
                    key: d.key,
                    target: d.target,
                    scope: d.scope.as_str(),
                    depends_on: d.depends_on.join(", "),
                }
            })
            .collect();
        print_output(&rows, ctx.format);
        Ok(RunStatus::Completed)
    }
}
