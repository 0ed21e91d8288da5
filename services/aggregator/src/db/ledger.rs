//! Run ledger storage.
//!
//! `aggregation_runs` holds one row per pipeline run and its status;
//! `aggregation_run_steps` holds one row per helper x state outcome. Status
//! transitions are compare-and-set on the previous status.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPool, postgres::PgRow, Row};
use uuid::Uuid;

use super::DbError;

/// A run as stored in the ledger.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunRow {
    pub run_id: Uuid,
    pub month: NaiveDate,
    pub helper: String,
    pub states: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<serde_json::Value>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RunRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            run_id: row.try_get("run_id")?,
            month: row.try_get("month")?,
            helper: row.try_get("helper")?,
            states: row.try_get("states")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            summary: row.try_get("summary")?,
        })
    }
}

/// One helper x state outcome.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StepRow {
    pub helper: String,
    pub state_id: Option<String>,
    pub outcome: String,
    pub source_rows: Option<i64>,
    pub excluded_rows: Option<i64>,
    pub rows_written: Option<i64>,
    pub warnings: Vec<String>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for StepRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            helper: row.try_get("helper")?,
            state_id: row.try_get("state_id")?,
            outcome: row.try_get("outcome")?,
            source_rows: row.try_get("source_rows")?,
            excluded_rows: row.try_get("excluded_rows")?,
            rows_written: row.try_get("rows_written")?,
            warnings: row.try_get("warnings")?,
            error_kind: row.try_get("error_kind")?,
            error: row.try_get("error")?,
            elapsed_ms: row.try_get("elapsed_ms")?,
        })
    }
}

/// Store for pipeline runs and their step outcomes.
#[derive(Clone)]
pub struct RunLedger {
    pool: PgPool,
}

impl RunLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new run in `status`.
    pub async fn insert_run(
        &self,
        run_id: Uuid,
        month: NaiveDate,
        helper: &str,
        states: &[String],
        status: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO aggregation_runs (run_id, month, helper, states, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(run_id)
        .bind(month)
        .bind(helper)
        .bind(states)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    /// Move a run from `from` to `to`.
    ///
    /// Stamps `started_at` on entering RUNNING. Fails if the run is missing or
    /// no longer in `from`.
    pub async fn update_status(&self, run_id: Uuid, from: &str, to: &str) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE aggregation_runs
            SET status = $3,
                started_at = CASE WHEN $3 = 'RUNNING' THEN now() ELSE started_at END
            WHERE run_id = $1 AND status = $2
            "#,
        )
        .bind(run_id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(run_id, from).await);
        }
        Ok(())
    }

    /// Move a run to a terminal status and store its summary.
    pub async fn finish_run(
        &self,
        run_id: Uuid,
        from: &str,
        to: &str,
        summary: &serde_json::Value,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE aggregation_runs
            SET status = $3, finished_at = now(), summary = $4
            WHERE run_id = $1 AND status = $2
            "#,
        )
        .bind(run_id)
        .bind(from)
        .bind(to)
        .bind(summary)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(run_id, from).await);
        }
        Ok(())
    }

    async fn transition_error(&self, run_id: Uuid, expected: &str) -> DbError {
        match self.get_run(run_id).await {
            Ok(run) => DbError::StatusConflict {
                run_id,
                expected: expected.to_string(),
                actual: run.status,
            },
            Err(e) => e,
        }
    }

    /// Append a step outcome to a run.
    pub async fn insert_step(&self, run_id: Uuid, step: &StepRow) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO aggregation_run_steps (
                run_id, helper, state_id, outcome, source_rows, excluded_rows,
                rows_written, warnings, error_kind, error, elapsed_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(run_id)
        .bind(&step.helper)
        .bind(&step.state_id)
        .bind(&step.outcome)
        .bind(step.source_rows)
        .bind(step.excluded_rows)
        .bind(step.rows_written)
        .bind(&step.warnings)
        .bind(&step.error_kind)
        .bind(&step.error)
        .bind(step.elapsed_ms)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    /// Get a single run.
    pub async fn get_run(&self, run_id: Uuid) -> Result<RunRow, DbError> {
        sqlx::query_as::<_, RunRow>(
            r#"
            SELECT run_id, month, helper, states, status, created_at,
                   started_at, finished_at, summary
            FROM aggregation_runs
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?
        .ok_or(DbError::RunNotFound(run_id))
    }

    /// Most recent runs first, optionally for one month only.
    pub async fn recent_runs(
        &self,
        month: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<RunRow>, DbError> {
        sqlx::query_as::<_, RunRow>(
            r#"
            SELECT run_id, month, helper, states, status, created_at,
                   started_at, finished_at, summary
            FROM aggregation_runs
            WHERE $1::date IS NULL OR month = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(month)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    /// Step outcomes of a run, in recording order.
    pub async fn steps(&self, run_id: Uuid) -> Result<Vec<StepRow>, DbError> {
        sqlx::query_as::<_, StepRow>(
            r#"
            SELECT helper, state_id, outcome, source_rows, excluded_rows,
                   rows_written, warnings, error_kind, error, elapsed_ms
            FROM aggregation_run_steps
            WHERE run_id = $1
            ORDER BY step_id
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}
