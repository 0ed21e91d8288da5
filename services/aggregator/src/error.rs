//! Aggregation error types.

use icds_partition::NamingError;
use thiserror::Error;

use crate::{db::DbError, helpers::render::RenderError};

/// Result type for aggregation operations.
pub type AggregationResult<T> = Result<T, AggregationError>;

/// Errors raised while planning or running aggregation helpers.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// A declared source is missing, empty for the month, or a dependency's
    /// partition is not attached.
    #[error("source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// A different table already covers the month, or the partition name is
    /// attached elsewhere.
    #[error("cannot attach {partition} to {parent}: conflicts with {existing}")]
    PartitionConflict {
        parent: String,
        partition: String,
        existing: String,
    },

    /// A populate statement failed.
    #[error("helper '{helper}' failed to compute: {message}")]
    Compute { helper: String, message: String },

    #[error("helper '{helper}' failed to build index '{index}': {source}")]
    IndexBuild {
        helper: String,
        index: String,
        #[source]
        source: sqlx::Error,
    },

    /// A global helper reads a source that is overridden per state.
    #[error("helper '{helper}' runs once per month but source '{source_id}' has per-state table overrides")]
    StateShardedSource { helper: String, source_id: String },

    #[error("unknown helper '{0}'")]
    UnknownHelper(String),

    #[error("dependency cycle through helpers: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("helper '{0}' is state-scoped and needs a state")]
    MissingState(String),

    #[error("no active states found in source '{0}'")]
    NoStates(String),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("invalid table name: {0}")]
    Naming(#[from] NamingError),

    #[error("failed to render SQL: {0}")]
    Render(#[from] RenderError),
}

impl AggregationError {
    /// Stable short name, stored in the run ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            AggregationError::SourceUnavailable { .. } => "source_unavailable",
            AggregationError::PartitionConflict { .. } => "partition_conflict",
            AggregationError::Compute { .. } => "compute",
            AggregationError::IndexBuild { .. } => "index_build",
            AggregationError::StateShardedSource { .. } => "state_sharded_source",
            AggregationError::UnknownHelper(_) => "unknown_helper",
            AggregationError::DependencyCycle(_) => "dependency_cycle",
            AggregationError::MissingState(_) => "missing_state",
            AggregationError::NoStates(_) => "no_states",
            AggregationError::Database(_) => "database",
            AggregationError::Sqlx(_) => "sqlx",
            AggregationError::Naming(_) => "naming",
            AggregationError::Render(_) => "render",
        }
    }

    pub(crate) fn compute(helper: &str, error: sqlx::Error) -> Self {
        AggregationError::Compute {
            helper: helper.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = AggregationError::DependencyCycle(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(err.to_string(), "dependency cycle through helpers: a -> b -> a");
        assert_eq!(err.kind(), "dependency_cycle");
    }

    #[test]
    fn test_conflict_message() {
        let err = AggregationError::PartitionConflict {
            parent: "agg_awc".to_string(),
            partition: "agg_awc_2020-08-01".to_string(),
            existing: "agg_awc_legacy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot attach agg_awc_2020-08-01 to agg_awc: conflicts with agg_awc_legacy"
        );
    }
}
