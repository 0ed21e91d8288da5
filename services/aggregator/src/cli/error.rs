//! Error display for the CLI.

use colored::Colorize;
use icds_aggregator::{db::DbError, error::AggregationError};

/// Print an error with a hint where one helps.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let hint = if let Some(agg) = err.downcast_ref::<AggregationError>() {
        aggregation_hint(agg)
    } else if let Some(db) = err.downcast_ref::<DbError>() {
        db_hint(db)
    } else {
        None
    };

    if let Some(hint) = hint {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn aggregation_hint(err: &AggregationError) -> Option<&'static str> {
    match err {
        AggregationError::UnknownHelper(_) => {
            Some("Run `icds-aggregate plan` to list table types.")
        }
        AggregationError::DependencyCycle(_) => {
            Some("Check depends_on in the helper catalog.")
        }
        AggregationError::SourceUnavailable { .. } => Some(
            "Check that the UCR table is populated, or set ICDS_SOURCES_FILE to map it.",
        ),
        AggregationError::PartitionConflict { .. } => Some(
            "Another table covers this month. Detach it by hand before rerunning.",
        ),
        AggregationError::StateShardedSource { .. } => Some(
            "Give that source a single `table` override in ICDS_SOURCES_FILE instead of per-state tables.",
        ),
        AggregationError::NoStates(_) => {
            Some("Pass --state explicitly or load the AWC location table first.")
        }
        AggregationError::Database(db) => db_hint(db),
        _ => None,
    }
}

fn db_hint(err: &DbError) -> Option<&'static str> {
    match err {
        DbError::Connect(_) => Some("Check DATABASE_URL and that Postgres is reachable."),
        DbError::MigrationDirNotFound { .. } => {
            Some("Run from the repository root or services/aggregator.")
        }
        DbError::Query(_) => Some("Run `icds-aggregate migrate` if the ledger tables are missing."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_helper_points_at_plan() {
        let err = AggregationError::UnknownHelper("agg-bihar".to_string());
        assert!(aggregation_hint(&err).unwrap().contains("plan"));
    }

    #[test]
    fn test_wrapped_db_error_uses_db_hint() {
        let err = AggregationError::Database(DbError::MigrationDirNotFound {
            tried: "./migrations".to_string(),
            last_error: "missing".to_string(),
        });
        assert_eq!(
            aggregation_hint(&err),
            Some("Run from the repository root or services/aggregator.")
        );
    }
}
