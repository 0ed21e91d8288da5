//! Month-range reruns and targeted field repairs.

use std::{fmt, str::FromStr};

use icds_partition::{partition_name, Ident, Month};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::{
    db::PartitionCatalog,
    error::{AggregationError, AggregationResult},
    helpers::{catalog, registry::HelperSelection},
    pipeline::{Pipeline, RunRecorder, RunRequest, RunStatus, RunSummary, StateSource},
};

/// Result of running a month range.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub runs: Vec<RunSummary>,
    /// First month that ended FAILED. Later months were not attempted.
    pub stopped_at: Option<Month>,
}

impl BackfillReport {
    /// The worst status across the runs.
    pub fn status(&self) -> RunStatus {
        if self.stopped_at.is_some() {
            RunStatus::Failed
        } else if self
            .runs
            .iter()
            .any(|r| r.status == RunStatus::PartiallyFailed)
        {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        }
    }
}

/// Run `selection` for every month in `[from, to]`, oldest first.
#[instrument(skip(pipeline, states), fields(from = %from, to = %to, helper = %selection))]
pub async fn backfill<R: RunRecorder>(
    pipeline: &Pipeline<R>,
    selection: &HelperSelection,
    from: Month,
    to: Month,
    states: Option<Vec<String>>,
) -> AggregationResult<BackfillReport> {
    let mut report = BackfillReport {
        runs: Vec::new(),
        stopped_at: None,
    };
    for month in from.through(to) {
        let summary = pipeline
            .run(&RunRequest {
                month,
                selection: selection.clone(),
                states: states.clone(),
            })
            .await?;
        let failed = summary.status == RunStatus::Failed;
        report.runs.push(summary);
        if failed {
            warn!(month = %month, "Stopping backfill at failed month");
            report.stopped_at = Some(month);
            break;
        }
    }
    info!(months = report.runs.len(), status = %report.status(), "Backfill finished");
    Ok(report)
}

/// A targeted correction of already-built rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldRepair {
    /// Recompute the ration columns of `child_health_monthly` from the THR
    /// form aggregate for the same month.
    ThrRations,
}

impl FieldRepair {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRepair::ThrRations => "thr-rations",
        }
    }

    /// Helpers whose partitions the repair reads and writes.
    fn tables(&self) -> (&'static str, &'static str) {
        match self {
            FieldRepair::ThrRations => ("child-health-monthly", "thr-forms-child-health"),
        }
    }

    fn statement(&self, target: &Ident, source: &Ident) -> String {
        match self {
            FieldRepair::ThrRations => format!(
                r#"
                UPDATE {target} AS chm
                SET days_ration_given_child = fixed.days_ration_given_child,
                    num_rations_distributed = CASE
                        WHEN chm.thr_eligible = 1 THEN COALESCE(fixed.days_ration_given_child, 0)
                        ELSE NULL
                    END
                FROM (
                    SELECT c.supervisor_id, c.case_id, thr.days_ration_given_child
                    FROM {target} c
                    LEFT JOIN {source} thr
                        ON thr.supervisor_id = c.supervisor_id AND thr.case_id = c.case_id
                    WHERE c.state_id = $1
                ) AS fixed
                WHERE chm.state_id = $1
                  AND chm.supervisor_id = fixed.supervisor_id
                  AND chm.case_id = fixed.case_id
                "#
            ),
        }
    }
}

impl FromStr for FieldRepair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thr-rations" => Ok(FieldRepair::ThrRations),
            other => Err(format!("unknown repair '{other}' (expected: thr-rations)")),
        }
    }
}

impl fmt::Display for FieldRepair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows touched by a repair in one month.
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub month: Month,
    pub states: usize,
    pub rows_updated: u64,
}

/// Applies a [`FieldRepair`] month by month, one transaction per month.
pub struct FieldRepairer {
    pool: PgPool,
    catalog: PartitionCatalog,
}

impl FieldRepairer {
    pub fn new(pool: PgPool) -> Self {
        Self {
            catalog: PartitionCatalog::new(pool.clone()),
            pool,
        }
    }

    #[instrument(skip(self, states), fields(repair = %repair, from = %from, to = %to))]
    pub async fn repair(
        &self,
        repair: FieldRepair,
        from: Month,
        to: Month,
        states: &dyn StateSource,
        explicit: Option<Vec<String>>,
    ) -> AggregationResult<Vec<RepairOutcome>> {
        let states = match explicit {
            Some(states) => states,
            None => states.active_states().await?,
        };
        let (target_key, source_key) = repair.tables();
        let target = fact_table(target_key)?;
        let source = fact_table(source_key)?;

        let mut outcomes = Vec::new();
        for month in from.through(to) {
            for parent in [&target, &source] {
                if !self.catalog.is_attached(parent, month).await? {
                    return Err(AggregationError::SourceUnavailable {
                        source_id: parent.as_str().to_string(),
                        reason: format!("no partition attached for {month}"),
                    });
                }
            }
            let target_partition = partition_name(&target, month)?;
            let source_partition = partition_name(&source, month)?;
            let sql = repair.statement(&target_partition, &source_partition);

            let mut tx = self.pool.begin().await?;
            let mut rows_updated = 0;
            for state in &states {
                let result = sqlx::query(&sql).bind(state).execute(&mut *tx).await?;
                rows_updated += result.rows_affected();
            }
            tx.commit().await?;

            info!(month = %month, rows_updated, "Repair applied");
            outcomes.push(RepairOutcome {
                month,
                states: states.len(),
                rows_updated,
            });
        }
        Ok(outcomes)
    }
}

fn fact_table(helper: &str) -> AggregationResult<Ident> {
    let descriptor =
        catalog::find(helper).ok_or_else(|| AggregationError::UnknownHelper(helper.to_string()))?;
    Ok(descriptor.target_ident()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_names() {
        assert_eq!("thr-rations".parse::<FieldRepair>(), Ok(FieldRepair::ThrRations));
        assert!("thr".parse::<FieldRepair>().is_err());
        assert_eq!(FieldRepair::ThrRations.to_string(), "thr-rations");
    }

    #[test]
    fn test_repair_statement_targets_month_partitions() {
        let month = Month::parse("2020-08").unwrap();
        let target = partition_name(&fact_table("child-health-monthly").unwrap(), month).unwrap();
        let source =
            partition_name(&fact_table("thr-forms-child-health").unwrap(), month).unwrap();
        let sql = FieldRepair::ThrRations.statement(&target, &source);
        assert!(sql.contains("UPDATE \"child_health_monthly_2020-08-01\" AS chm"));
        assert!(sql.contains("LEFT JOIN \"icds_dashboard_child_health_thr_forms_2020-08-01\" thr"));
        assert!(!sql.contains("2020-08-01'"));
    }

    #[test]
    fn test_backfill_status_is_the_worst_month() {
        let report = BackfillReport {
            runs: Vec::new(),
            stopped_at: Some(Month::parse("2020-09").unwrap()),
        };
        assert_eq!(report.status(), RunStatus::Failed);
        let empty = BackfillReport {
            runs: Vec::new(),
            stopped_at: None,
        };
        assert_eq!(empty.status(), RunStatus::Completed);
    }
}
