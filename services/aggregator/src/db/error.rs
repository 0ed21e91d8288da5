//! Database error types.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/aggregator.")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// Run id not present in the ledger.
    #[error("aggregation run not found: {0}")]
    RunNotFound(uuid::Uuid),

    /// A run was not in the status a transition expected.
    #[error("run {run_id} is {actual}, expected {expected}")]
    StatusConflict {
        run_id: uuid::Uuid,
        expected: String,
        actual: String,
    },

    /// A ledger row holds a status this build does not know.
    #[error("unknown run status '{0}' in ledger")]
    UnknownStatus(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
